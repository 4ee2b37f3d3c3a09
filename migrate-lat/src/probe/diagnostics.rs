use aya::maps::PerCpuArray;
use aya::Ebpf;
use migrate_lat_common::{
    STAT_DROPPED, STAT_MATCHED, STAT_PUBLISHED, STAT_STARTS, STAT_START_FAILED, STAT_UNMATCHED,
};
use std::fmt;

use crate::domain::TracerError;

/// Kernel-side counters, summed across CPUs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStats {
    pub starts: u64,
    pub start_failed: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub published: u64,
    pub dropped: u64,
}

impl KernelStats {
    /// Matched completions that were neither published nor dropped
    ///
    /// Zero unless counters were read mid-completion.
    #[must_use]
    pub fn unaccounted(&self) -> u64 {
        self.matched.saturating_sub(self.published + self.dropped)
    }
}

impl fmt::Display for KernelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "starts={} start_failed={} matched={} unmatched={} published={} dropped={}",
            self.starts,
            self.start_failed,
            self.matched,
            self.unmatched,
            self.published,
            self.dropped
        )
    }
}

/// Read the `STATS` per-CPU counters
///
/// # Errors
/// Returns an error if the map is missing or cannot be read
pub fn read_kernel_stats(bpf: &Ebpf) -> Result<KernelStats, TracerError> {
    let stats: PerCpuArray<_, u64> =
        PerCpuArray::try_from(bpf.map("STATS").ok_or(TracerError::MapNotFound("STATS"))?)?;
    let total = |index: u32| -> Result<u64, TracerError> {
        Ok(stats.get(&index, 0)?.iter().sum())
    };

    Ok(KernelStats {
        starts: total(STAT_STARTS)?,
        start_failed: total(STAT_START_FAILED)?,
        matched: total(STAT_MATCHED)?,
        unmatched: total(STAT_UNMATCHED)?,
        published: total(STAT_PUBLISHED)?,
        dropped: total(STAT_DROPPED)?,
    })
}

/// Print kernel counters to stderr, flagging the ones that mean lost samples
pub fn print_kernel_stats(stats: &KernelStats) {
    eprintln!("\n🔍 Kernel counters: {stats}");
    if stats.dropped > 0 {
        eprintln!("   ⚠️  {} samples dropped: ring buffer full or payload unreadable", stats.dropped);
    }
    if stats.unaccounted() > 0 {
        eprintln!("   ⚠️  {} matched samples unaccounted for", stats.unaccounted());
    }
    if stats.start_failed > 0 {
        eprintln!("   ⚠️  {} starts not recorded: start table update failed", stats.start_failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let stats = KernelStats { starts: 5, matched: 4, unmatched: 1, published: 3, dropped: 1, ..Default::default() };
        assert_eq!(
            stats.to_string(),
            "starts=5 start_failed=0 matched=4 unmatched=1 published=3 dropped=1"
        );
        assert_eq!(stats.unaccounted(), 0);
    }

    #[test]
    fn test_unaccounted_matches() {
        let stats = KernelStats { matched: 10, published: 6, dropped: 1, ..Default::default() };
        assert_eq!(stats.unaccounted(), 3);
    }
}
