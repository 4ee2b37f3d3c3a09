//! Identity key builder
//!
//! Userspace mirror of the eBPF `make_key()`: the correlation key is the
//! task id paired with the task's cgroup v2 id.

use migrate_lat_common::{CorrelationKey, CGROUP_ID_UNKNOWN, TASK_COMM_LEN};
use std::fs;
use std::os::unix::fs::MetadataExt;

/// Root of the cgroup v2 hierarchy
const CGROUP2_ROOT: &str = "/sys/fs/cgroup";

/// Identity of the task that triggered a start or completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// Kernel task id (thread id)
    pub tid: u32,
    /// Thread group id (process id), reported in samples
    pub tgid: u32,
    /// cgroup v2 id, `None` when it could not be determined
    pub cgroup_id: Option<u64>,
    /// Command name, kernel-truncated
    pub comm: [u8; TASK_COMM_LEN],
}

impl TaskSnapshot {
    #[must_use]
    pub fn new(tid: u32, tgid: u32, comm: &str) -> Self {
        Self { tid, tgid, cgroup_id: None, comm: comm_bytes(comm) }
    }

    #[must_use]
    pub fn with_cgroup(mut self, cgroup_id: u64) -> Self {
        self.cgroup_id = Some(cgroup_id);
        self
    }

    /// Capture the calling thread
    ///
    /// Never fails: unreadable procfs or cgroupfs entries leave the comm
    /// empty and the cgroup id unknown.
    #[must_use]
    pub fn current() -> Self {
        #[allow(unsafe_code)]
        // SAFETY: gettid() has no preconditions and cannot fail
        let tid = unsafe { libc::gettid() };
        let comm = fs::read_to_string("/proc/thread-self/comm").unwrap_or_default();

        Self {
            tid: tid.unsigned_abs(),
            tgid: std::process::id(),
            cgroup_id: current_cgroup_id(),
            comm: comm_bytes(comm.trim_end()),
        }
    }

    /// Build the correlation key, substituting the sentinel for an unknown cgroup
    #[must_use]
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.tid, self.cgroup_id.unwrap_or(CGROUP_ID_UNKNOWN))
    }
}

/// Copy a name into a kernel-style comm buffer (at most 15 bytes + NUL)
#[must_use]
pub fn comm_bytes(name: &str) -> [u8; TASK_COMM_LEN] {
    let mut comm = [0u8; TASK_COMM_LEN];
    let bytes = name.as_bytes();
    let copy_len = bytes.len().min(TASK_COMM_LEN - 1);
    comm[..copy_len].copy_from_slice(&bytes[..copy_len]);
    comm
}

/// cgroup v2 id of the calling thread: the inode of its cgroup directory
fn current_cgroup_id() -> Option<u64> {
    let content = fs::read_to_string("/proc/thread-self/cgroup").ok()?;
    let path = parse_unified_cgroup_path(&content)?;
    let meta = fs::metadata(format!("{CGROUP2_ROOT}{path}")).ok()?;
    Some(meta.ino())
}

/// Extract the unified-hierarchy path from `/proc/<pid>/cgroup` (the `0::` line)
fn parse_unified_cgroup_path(content: &str) -> Option<&str> {
    content.lines().find_map(|line| line.strip_prefix("0::")).map(str::trim)
}
