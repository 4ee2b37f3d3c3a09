//! Symbolic names for the codes carried in a latency sample
//!
//! The kernel reports `enum migrate_mode` and `enum migrate_reason` as raw
//! integers. The wire record keeps them raw; these types only label them
//! for display.

use std::fmt;

/// `enum migrate_mode` (include/linux/migrate_mode.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateMode {
    Async,
    SyncLight,
    Sync,
    SyncNoCopy,
}

impl MigrateMode {
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Async),
            1 => Some(Self::SyncLight),
            2 => Some(Self::Sync),
            3 => Some(Self::SyncNoCopy),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Async => "MIGRATE_ASYNC",
            Self::SyncLight => "MIGRATE_SYNC_LIGHT",
            Self::Sync => "MIGRATE_SYNC",
            Self::SyncNoCopy => "MIGRATE_SYNC_NO_COPY",
        }
    }

    /// Label for a raw code, `UNKNOWN(n)` when the kernel sent something newer
    #[must_use]
    pub fn label(code: u32) -> String {
        Self::from_code(code).map_or_else(|| format!("UNKNOWN({code})"), |m| m.name().to_string())
    }
}

impl fmt::Display for MigrateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `enum migrate_reason` (include/linux/migrate_mode.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateReason {
    Compaction,
    MemoryFailure,
    MemoryHotplug,
    Syscall,
    MempolicyMbind,
    NumaMisplaced,
    ContigRange,
    LongtermPin,
    Demotion,
    Damon,
}

impl MigrateReason {
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Compaction),
            1 => Some(Self::MemoryFailure),
            2 => Some(Self::MemoryHotplug),
            3 => Some(Self::Syscall),
            4 => Some(Self::MempolicyMbind),
            5 => Some(Self::NumaMisplaced),
            6 => Some(Self::ContigRange),
            7 => Some(Self::LongtermPin),
            8 => Some(Self::Demotion),
            9 => Some(Self::Damon),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Compaction => "MR_COMPACTION",
            Self::MemoryFailure => "MR_MEMORY_FAILURE",
            Self::MemoryHotplug => "MR_MEMORY_HOTPLUG",
            Self::Syscall => "MR_SYSCALL",
            Self::MempolicyMbind => "MR_MEMPOLICY_MBIND",
            Self::NumaMisplaced => "MR_NUMA_MISPLACED",
            Self::ContigRange => "MR_CONTIG_RANGE",
            Self::LongtermPin => "MR_LONGTERM_PIN",
            Self::Demotion => "MR_DEMOTION",
            Self::Damon => "MR_DAMON",
        }
    }

    /// Label for a raw code, `UNKNOWN(n)` when the kernel sent something newer
    #[must_use]
    pub fn label(code: u32) -> String {
        Self::from_code(code).map_or_else(|| format!("UNKNOWN({code})"), |r| r.name().to_string())
    }
}

impl fmt::Display for MigrateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_labels() {
        assert_eq!(MigrateMode::label(1), "MIGRATE_SYNC_LIGHT");
        assert_eq!(MigrateMode::label(17), "UNKNOWN(17)");
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(MigrateReason::label(3), "MR_SYSCALL");
        assert_eq!(MigrateReason::label(5).as_str(), MigrateReason::NumaMisplaced.name());
        assert_eq!(MigrateReason::label(99), "UNKNOWN(99)");
    }
}
