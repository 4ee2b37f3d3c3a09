//! Start recording and completion handling
//!
//! [`Tracer`] is the entry point for the two trigger feeds: call
//! [`Tracer::start`] where the operation begins and [`Tracer::complete`]
//! where it returns. Both are safe to call from any number of threads at
//! once and neither ever blocks on the consumer.

use migrate_lat_common::LatencyEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::{StartTable, TaskSnapshot};
use crate::channel::RingProducer;

/// Monotonic nanosecond clock
///
/// Must never go backwards; wall-clock sources are not acceptable.
pub trait MonotonicClock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Process-local monotonic clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Clock advanced by hand, for replaying recorded timestamps
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    #[must_use]
    pub fn new(start_ns: u64) -> Self {
        Self(AtomicU64::new(start_ns))
    }

    pub fn set(&self, ns: u64) {
        self.0.store(ns, Ordering::SeqCst);
    }

    pub fn advance(&self, ns: u64) {
        self.0.fetch_add(ns, Ordering::SeqCst);
    }
}

impl MonotonicClock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome fields carried by the completion event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateOutcome {
    pub succeeded: u64,
    pub failed: u64,
    pub mode: u32,
    pub reason: u32,
}

/// What happened to one completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Matched and handed to the ring
    Published(LatencyEvent),
    /// No start entry for this key; nothing reported
    Unmatched,
    /// Matched, but the ring was full and the sample was discarded
    Dropped,
}

#[derive(Default)]
struct Counters {
    starts: AtomicU64,
    matched: AtomicU64,
    unmatched: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the tracer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracerStats {
    pub starts: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub published: u64,
    pub dropped: u64,
    pub evicted: u64,
}

/// Matches completions against recorded starts and publishes samples
pub struct CompletionHandler {
    table: Arc<StartTable>,
    ring: RingProducer,
    counters: Arc<Counters>,
}

impl CompletionHandler {
    /// Handle a completion observed at `now_ns`
    pub fn handle(&self, task: &TaskSnapshot, now_ns: u64, outcome: MigrateOutcome) -> Completion {
        let key = task.correlation_key();
        let Some(entry) = self.table.take_and_remove(&key) else {
            self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
            return Completion::Unmatched;
        };
        self.counters.matched.fetch_add(1, Ordering::Relaxed);

        let event = LatencyEvent {
            comm: task.comm,
            pid: task.tgid,
            _padding: [0; 4],
            delta_ns: now_ns.saturating_sub(entry.timestamp),
            pages_ok: outcome.succeeded,
            pages_failed: outcome.failed,
            mode: outcome.mode,
            reason: outcome.reason,
        };

        // Full ring: drop the sample, never block
        if self.ring.try_publish(&event).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Completion::Dropped;
        }

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        Completion::Published(event)
    }
}

/// Start/completion correlator for userspace-observed operations
pub struct Tracer<C: MonotonicClock = SystemClock> {
    table: Arc<StartTable>,
    handler: CompletionHandler,
    counters: Arc<Counters>,
    clock: C,
}

impl<C: MonotonicClock> Tracer<C> {
    #[must_use]
    pub fn new(table: Arc<StartTable>, ring: RingProducer, clock: C) -> Self {
        let counters = Arc::new(Counters::default());
        let handler = CompletionHandler {
            table: Arc::clone(&table),
            ring,
            counters: Arc::clone(&counters),
        };
        Self { table, handler, counters, clock }
    }

    /// Record that `task` started an operation now
    pub fn start(&self, task: &TaskSnapshot) {
        self.start_at(task, self.clock.now_ns());
    }

    /// Record that `task` started an operation at `timestamp`
    pub fn start_at(&self, task: &TaskSnapshot, timestamp: u64) {
        self.table.record_start(task.correlation_key(), timestamp);
        self.counters.starts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that `task` finished its operation now
    pub fn complete(&self, task: &TaskSnapshot, outcome: MigrateOutcome) -> Completion {
        self.complete_at(task, self.clock.now_ns(), outcome)
    }

    /// Record that `task` finished its operation at `timestamp`
    pub fn complete_at(
        &self,
        task: &TaskSnapshot,
        timestamp: u64,
        outcome: MigrateOutcome,
    ) -> Completion {
        self.handler.handle(task, timestamp, outcome)
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub fn stats(&self) -> TracerStats {
        let c = &self.counters;
        TracerStats {
            starts: c.starts.load(Ordering::Relaxed),
            matched: c.matched.load(Ordering::Relaxed),
            unmatched: c.unmatched.load(Ordering::Relaxed),
            published: c.published.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            evicted: self.table.evicted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::event_ring;
    use std::time::Duration;

    fn tracer(ring_bytes: usize) -> (Tracer<ManualClock>, crate::channel::RingConsumer) {
        let (tx, rx) = event_ring(ring_bytes);
        (Tracer::new(Arc::new(StartTable::default()), tx, ManualClock::new(0)), rx)
    }

    #[test]
    fn test_elapsed_uses_injected_clock() {
        let (tracer, rx) = tracer(1 << 16);
        let task = TaskSnapshot::new(10, 10, "migratepages");

        tracer.clock().set(1_000);
        tracer.start(&task);
        tracer.clock().advance(4_500);
        let done = tracer.complete(&task, MigrateOutcome::default());

        let Completion::Published(event) = done else { panic!("expected a sample, got {done:?}") };
        assert_eq!(event.delta_ns, 4_500);
        assert_eq!(rx.poll(Duration::from_millis(10)).len(), 1);
    }

    #[test]
    fn test_unmatched_completion_is_silent() {
        let (tracer, rx) = tracer(1 << 16);
        let task = TaskSnapshot::new(10, 10, "x");

        assert_eq!(tracer.complete_at(&task, 5, MigrateOutcome::default()), Completion::Unmatched);
        assert!(rx.poll(Duration::from_millis(5)).is_empty());
        assert_eq!(tracer.stats().unmatched, 1);
    }

    #[test]
    fn test_clock_skew_saturates() {
        let (tracer, _rx) = tracer(1 << 16);
        let task = TaskSnapshot::new(1, 1, "x");
        tracer.start_at(&task, 1_000);

        let done = tracer.complete_at(&task, 10, MigrateOutcome::default());
        assert!(matches!(done, Completion::Published(e) if e.delta_ns == 0));
    }

    #[test]
    fn test_full_ring_drops_sample() {
        // Room for exactly one record
        let (tracer, rx) = tracer(LatencyEvent::SIZE + 8);
        let a = TaskSnapshot::new(1, 1, "a");
        let b = TaskSnapshot::new(2, 2, "b");

        tracer.start_at(&a, 0);
        tracer.start_at(&b, 0);
        assert!(matches!(tracer.complete_at(&a, 1, MigrateOutcome::default()), Completion::Published(_)));
        assert_eq!(tracer.complete_at(&b, 1, MigrateOutcome::default()), Completion::Dropped);

        let stats = tracer.stats();
        assert_eq!((stats.matched, stats.published, stats.dropped), (2, 1, 1));
        assert_eq!(rx.dropped(), 1);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
