//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines data structures and constants shared between the kernel-side eBPF
//! programs and userspace. All types use `#[repr(C)]` for consistent memory
//! layout across the kernel/userspace boundary.
//!
//! ## Correlation Pipeline
//!
//! 1. `mm_migrate_pages_start` fires → the current task's [`CorrelationKey`]
//!    and a monotonic timestamp go into the `STARTS` table
//! 2. `mm_migrate_pages` fires → the entry for the same key is taken out,
//!    the elapsed time computed, and a [`LatencyEvent`] published on `EVENTS`
//! 3. Userspace drains `EVENTS`, decodes, filters, and prints
//!
//! ## Key Types
//!
//! - [`CorrelationKey`] - Identity matching a start event to its completion
//! - [`LatencyEvent`] - Fixed-layout record passed via ring buffer

#![no_std]

// ============================================================================
// Capacities
// ============================================================================

/// Maximum live start entries in the `STARTS` table
///
/// The table evicts the least recently started entry when full, so abandoned
/// starts (no completion ever observed) cannot grow kernel memory unbounded.
pub const START_TABLE_CAPACITY: u32 = 8192;

/// Size of the `EVENTS` ring buffer in bytes (16 MiB, must be a power of two)
pub const EVENT_RING_BYTES: u32 = 1 << 24;

/// Per-record header the BPF ring buffer stores in front of every sample
pub const RING_RECORD_HEADER: usize = 8;

/// Kernel `TASK_COMM_LEN`, including the terminating NUL
pub const TASK_COMM_LEN: usize = 16;

/// Sentinel cgroup id used when the isolation scope cannot be determined
pub const CGROUP_ID_UNKNOWN: u64 = 0;

// ============================================================================
// Runtime Configuration (CONFIG array)
// ============================================================================

/// Offset of `succeeded` within the `mm_migrate_pages` tracepoint record
pub const CONFIG_OFFSET_SUCCEEDED: u32 = 0;
/// Offset of `failed` within the `mm_migrate_pages` tracepoint record
pub const CONFIG_OFFSET_FAILED: u32 = 1;
/// Offset of `mode` within the `mm_migrate_pages` tracepoint record
pub const CONFIG_OFFSET_MODE: u32 = 2;
/// Offset of `reason` within the `mm_migrate_pages` tracepoint record
pub const CONFIG_OFFSET_REASON: u32 = 3;
/// Number of slots in the `CONFIG` array
pub const CONFIG_ENTRIES: u32 = 4;

/// Field offsets of `mm_migrate_pages` on kernels 5.x through 6.7
///
/// Layout from `/sys/kernel/tracing/events/migrate/mm_migrate_pages/format`:
/// 8 bytes of common fields, then `succeeded`, `failed`, `thp_succeeded`,
/// `thp_failed`, `thp_split` (all `unsigned long`), `mode`, `reason`.
/// Userspace overwrites these with the offsets parsed from tracefs.
pub const DEFAULT_SUCCEEDED_OFFSET: u32 = 8;
pub const DEFAULT_FAILED_OFFSET: u32 = 16;
pub const DEFAULT_MODE_OFFSET: u32 = 48;
pub const DEFAULT_REASON_OFFSET: u32 = 52;

// ============================================================================
// Diagnostic Counters (STATS per-CPU array)
// ============================================================================

/// Start events recorded into the table
pub const STAT_STARTS: u32 = 0;
/// Start events the table refused to store
pub const STAT_START_FAILED: u32 = 1;
/// Completions that found their start entry
pub const STAT_MATCHED: u32 = 2;
/// Completions with no start entry (measurement began mid-operation, or evicted)
pub const STAT_UNMATCHED: u32 = 3;
/// Samples written to the ring buffer
pub const STAT_PUBLISHED: u32 = 4;
/// Matched samples not published: ring buffer full or payload unreadable
pub const STAT_DROPPED: u32 = 5;
/// Number of slots in the `STATS` array
pub const STAT_ENTRIES: u32 = 6;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Key for the start-timestamp table
///
/// A bare thread id is not enough: the same numeric id can appear in
/// different pid namespaces, and nested containers can run overlapping
/// migrations. Pairing it with the cgroup id keeps those apart.
///
/// **Memory Layout**: the padding is an explicit, always-zero field so two
/// equal keys hash to the same bucket in the kernel map.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    /// Kernel task id (TID in userspace terms)
    pub tid: u32,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],

    /// cgroup v2 id of the task, or [`CGROUP_ID_UNKNOWN`]
    pub cgroup_id: u64,
}

impl CorrelationKey {
    #[must_use]
    pub const fn new(tid: u32, cgroup_id: u64) -> Self {
        Self { tid, _padding: [0; 4], cgroup_id }
    }
}

/// Latency sample sent from eBPF to userspace via ring buffer
///
/// One event per matched (start, completion) pair. The record is copied
/// whole into the ring; no pointers cross the boundary.
///
/// **Size**: 56 bytes ([`LatencyEvent::SIZE`])
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyEvent {
    /// Command name of the migrating task (truncated, not always NUL-terminated)
    pub comm: [u8; TASK_COMM_LEN],

    /// Process ID (TGID in Linux terms)
    pub pid: u32,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],

    /// Elapsed time between start and completion, in nanoseconds
    ///
    /// Both ends come from the monotonic clock (`bpf_ktime_get_ns()`).
    pub delta_ns: u64,

    /// Pages migrated successfully
    pub pages_ok: u64,

    /// Pages that failed to migrate
    pub pages_failed: u64,

    /// `enum migrate_mode` value
    pub mode: u32,

    /// `enum migrate_reason` value
    pub reason: u32,
}

// Field offsets of the wire layout
const COMM_AT: usize = 0;
const PID_AT: usize = 16;
const DELTA_AT: usize = 24;
const OK_AT: usize = 32;
const FAILED_AT: usize = 40;
const MODE_AT: usize = 48;
const REASON_AT: usize = 52;

impl LatencyEvent {
    /// Size of one record on the wire
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Serialize into the native-endian wire layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[COMM_AT..COMM_AT + TASK_COMM_LEN].copy_from_slice(&self.comm);
        out[PID_AT..PID_AT + 4].copy_from_slice(&self.pid.to_ne_bytes());
        out[DELTA_AT..DELTA_AT + 8].copy_from_slice(&self.delta_ns.to_ne_bytes());
        out[OK_AT..OK_AT + 8].copy_from_slice(&self.pages_ok.to_ne_bytes());
        out[FAILED_AT..FAILED_AT + 8].copy_from_slice(&self.pages_failed.to_ne_bytes());
        out[MODE_AT..MODE_AT + 4].copy_from_slice(&self.mode.to_ne_bytes());
        out[REASON_AT..REASON_AT + 4].copy_from_slice(&self.reason.to_ne_bytes());
        out
    }

    /// Parse a record from the wire layout
    ///
    /// Returns `None` unless `bytes` is exactly [`LatencyEvent::SIZE`] long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }

        let mut comm = [0u8; TASK_COMM_LEN];
        comm.copy_from_slice(&bytes[COMM_AT..COMM_AT + TASK_COMM_LEN]);

        Some(Self {
            comm,
            pid: u32::from_ne_bytes(field(bytes, PID_AT)),
            _padding: [0; 4],
            delta_ns: u64::from_ne_bytes(field(bytes, DELTA_AT)),
            pages_ok: u64::from_ne_bytes(field(bytes, OK_AT)),
            pages_failed: u64::from_ne_bytes(field(bytes, FAILED_AT)),
            mode: u32::from_ne_bytes(field(bytes, MODE_AT)),
            reason: u32::from_ne_bytes(field(bytes, REASON_AT)),
        })
    }
}

fn field<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

#[cfg(feature = "user")]
use aya::Pod;

// Pod marks these as plain bytes for aya map and ring buffer access
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for CorrelationKey {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for LatencyEvent {}
