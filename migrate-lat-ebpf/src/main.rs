//! # eBPF Kernel-Side Instrumentation
//!
//! eBPF programs that time page migrations inside the Linux kernel.
//!
//! ## Programs
//!
//! - **Tracepoint**: `migrate_pages_start` - `migrate/mm_migrate_pages_start`, records T0
//! - **Tracepoint**: `migrate_pages_end` - `migrate/mm_migrate_pages`, computes Δt and publishes
//!
//! ## Maps (Shared with Userspace)
//!
//! - `STARTS` - LRU hash, correlation key → start timestamp
//! - `EVENTS` - Ring buffer (16MB) for latency samples
//! - `CONFIG` - Tracepoint field offsets discovered by userspace
//! - `STATS` - Per-CPU diagnostic counters
//!
//! ## Build
//!
//! Always compiled in release mode (debug includes incompatible formatting code):
//! ```bash
//! cargo xtask build-ebpf --release
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_ktime_get_ns,
        gen::bpf_get_current_cgroup_id,
    },
    macros::{map, tracepoint},
    maps::{Array, LruHashMap, PerCpuArray, RingBuf},
    programs::TracePointContext,
};
use aya_log_ebpf::warn;
use migrate_lat_common::{
    CorrelationKey, LatencyEvent, CONFIG_ENTRIES, CONFIG_OFFSET_FAILED, CONFIG_OFFSET_MODE,
    CONFIG_OFFSET_REASON, CONFIG_OFFSET_SUCCEEDED, DEFAULT_FAILED_OFFSET, DEFAULT_MODE_OFFSET,
    DEFAULT_REASON_OFFSET, DEFAULT_SUCCEEDED_OFFSET, EVENT_RING_BYTES, START_TABLE_CAPACITY,
    STAT_DROPPED, STAT_ENTRIES, STAT_MATCHED, STAT_PUBLISHED, STAT_STARTS, STAT_START_FAILED,
    STAT_UNMATCHED, TASK_COMM_LEN,
};

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Map: Correlation key → start timestamp (ns)
///
/// LRU so that starts whose completion never fires age out instead of
/// pinning slots forever. A second start on the same key replaces the first.
#[map]
static STARTS: LruHashMap<CorrelationKey, u64> =
    LruHashMap::with_max_entries(START_TABLE_CAPACITY, 0);

/// Ring buffer for sending latency samples to userspace
///
/// - **Size**: 16MB
/// - **Overflow**: `output()` fails and the sample is dropped (counted in `STATS`)
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(EVENT_RING_BYTES, 0);

/// Map: Config index → tracepoint field offset
///
/// Populated by userspace from the tracefs `format` file. A zero slot means
/// "not configured" and the built-in default is used.
#[map]
static CONFIG: Array<u32> = Array::with_max_entries(CONFIG_ENTRIES, 0);

/// Per-CPU counters, indexed by the `STAT_*` constants
#[map]
static STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(STAT_ENTRIES, 0);

// ============================================================================
// Helpers
// ============================================================================

#[inline(always)]
fn make_key() -> CorrelationKey {
    let tid = unsafe { bpf_get_current_pid_tgid() } as u32;
    let cgroup_id = unsafe { bpf_get_current_cgroup_id() };
    CorrelationKey::new(tid, cgroup_id)
}

#[inline(always)]
fn bump(stat: u32) {
    if let Some(counter) = STATS.get_ptr_mut(stat) {
        unsafe { *counter += 1 };
    }
}

#[inline(always)]
fn offset(index: u32, default: u32) -> usize {
    match CONFIG.get(index) {
        Some(&value) if value != 0 => value as usize,
        _ => default as usize,
    }
}

// ============================================================================
// eBPF Program Hooks
// ============================================================================

/// Hook: migrate/mm_migrate_pages_start
/// Fires when `migrate_pages()` begins
#[tracepoint]
pub fn migrate_pages_start(ctx: TracePointContext) -> u32 {
    match try_migrate_pages_start(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_migrate_pages_start(ctx: &TracePointContext) -> Result<(), i64> {
    let key = make_key();
    let ts = unsafe { bpf_ktime_get_ns() };

    if let Err(e) = STARTS.insert(&key, &ts, 0) {
        bump(STAT_START_FAILED);
        warn!(ctx, "start insert failed for tid {}: {}", key.tid, e);
        return Err(e);
    }

    bump(STAT_STARTS);
    Ok(())
}

/// Hook: migrate/mm_migrate_pages
/// Fires when `migrate_pages()` returns, carrying the outcome counts
#[tracepoint]
pub fn migrate_pages_end(ctx: TracePointContext) -> u32 {
    match try_migrate_pages_end(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// `succeeded`, `failed`, `mode`, `reason` at the offsets in `CONFIG`
///
/// Layout from /sys/kernel/tracing/events/migrate/mm_migrate_pages/format
#[inline(always)]
fn read_payload(ctx: &TracePointContext) -> Result<(u64, u64, u32, u32), i64> {
    let pages_ok: u64 =
        unsafe { ctx.read_at(offset(CONFIG_OFFSET_SUCCEEDED, DEFAULT_SUCCEEDED_OFFSET))? };
    let pages_failed: u64 =
        unsafe { ctx.read_at(offset(CONFIG_OFFSET_FAILED, DEFAULT_FAILED_OFFSET))? };
    let mode: u32 = unsafe { ctx.read_at(offset(CONFIG_OFFSET_MODE, DEFAULT_MODE_OFFSET))? };
    let reason: u32 =
        unsafe { ctx.read_at(offset(CONFIG_OFFSET_REASON, DEFAULT_REASON_OFFSET))? };
    Ok((pages_ok, pages_failed, mode, reason))
}

fn try_migrate_pages_end(ctx: &TracePointContext) -> Result<(), i64> {
    let key = make_key();

    // Start and completion fire on the same thread, so nothing else writes
    // this key between the copy and the delete.
    let Some(start_ns) = (unsafe { STARTS.get(&key).copied() }) else {
        bump(STAT_UNMATCHED);
        return Ok(());
    };
    let delta_ns = unsafe { bpf_ktime_get_ns() }.saturating_sub(start_ns);
    let payload = read_payload(ctx);
    let _ = STARTS.remove(&key);
    bump(STAT_MATCHED);

    // Every matched completion ends up published or dropped
    let Ok((pages_ok, pages_failed, mode, reason)) = payload else {
        bump(STAT_DROPPED);
        return payload.map(|_| ());
    };

    let event = LatencyEvent {
        comm: bpf_get_current_comm().unwrap_or([0u8; TASK_COMM_LEN]),
        pid: (unsafe { bpf_get_current_pid_tgid() } >> 32) as u32,
        _padding: [0u8; 4],
        delta_ns,
        pages_ok,
        pages_failed,
        mode,
        reason,
    };

    // Full ring: drop the sample, never retry from the traced context
    if EVENTS.output(&event, 0).is_err() {
        bump(STAT_DROPPED);
        return Ok(());
    }

    bump(STAT_PUBLISHED);
    Ok(())
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
