//! In-process event delivery channel
//!
//! Bounded, lossy ring carrying fixed-size [`LatencyEvent`] frames from any
//! number of producers to one consumer. Userspace counterpart of the kernel
//! `EVENTS` ring buffer, with the same contract:
//!
//! - [`RingProducer::try_publish`] copies the record in or fails at once when
//!   the ring is full. It never blocks and never retries.
//! - [`RingConsumer::poll`] waits up to a timeout for the first record, then
//!   returns what was already queued, oldest first, never more than one
//!   ring's worth per call.
//!
//! Records cross as serialized bytes, not as shared structs. Backing storage
//! is `crossbeam-channel`'s lock-free bounded array queue.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use migrate_lat_common::{LatencyEvent, RING_RECORD_HEADER};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::thread;
use thiserror::Error;

/// One serialized record
pub type Record = [u8; LatencyEvent::SIZE];

/// Why a record did not make it into the ring
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    #[error("event ring full")]
    Full,
    #[error("event ring consumer gone")]
    Closed,
}

#[derive(Default)]
struct RingStats {
    dropped: AtomicU64,
}

/// Number of records a ring of `byte_size` bytes holds
///
/// Accounts for the per-record header the kernel ring buffer stores, so the
/// in-process ring fills at the same point the kernel one would.
#[must_use]
pub fn slots_for(byte_size: usize) -> usize {
    (byte_size / (LatencyEvent::SIZE + RING_RECORD_HEADER)).max(1)
}

/// Construct a ring of `byte_size` bytes
#[must_use]
pub fn event_ring(byte_size: usize) -> (RingProducer, RingConsumer) {
    let (tx, rx) = crossbeam_channel::bounded(slots_for(byte_size));
    let stats = Arc::new(RingStats::default());
    (RingProducer { tx, stats: Arc::clone(&stats) }, RingConsumer { rx, stats })
}

/// Producer side; clone one per producing thread
#[derive(Clone)]
pub struct RingProducer {
    tx: Sender<Record>,
    stats: Arc<RingStats>,
}

impl RingProducer {
    /// Copy `event` into the ring without waiting
    ///
    /// # Errors
    /// [`PublishError::Full`] when no slot is free; the record is dropped and
    /// counted.
    pub fn try_publish(&self, event: &LatencyEvent) -> Result<(), PublishError> {
        match self.tx.try_send(event.to_bytes()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(match e {
                    TrySendError::Full(_) => PublishError::Full,
                    TrySendError::Disconnected(_) => PublishError::Closed,
                })
            }
        }
    }
}

/// Consumer side; there is exactly one
pub struct RingConsumer {
    rx: Receiver<Record>,
    stats: Arc<RingStats>,
}

impl RingConsumer {
    /// Wait up to `timeout` for at least one record, then drain what is queued
    ///
    /// Records published while draining are left for the next call, so one
    /// call returns at most [`capacity`](Self::capacity) records. Returns an
    /// empty vector on timeout. With every producer gone the call still
    /// waits out `timeout`.
    #[must_use]
    pub fn poll(&self, timeout: Duration) -> Vec<Record> {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(record) => record,
            Err(RecvTimeoutError::Timeout) => return Vec::new(),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                return Vec::new();
            }
        };

        let queued = self.rx.len().min(self.capacity().saturating_sub(1));
        let mut records = Vec::with_capacity(1 + queued);
        records.push(first);
        records.extend(self.rx.try_iter().take(queued));
        records
    }

    /// Ring capacity in records
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    /// Records rejected by producers because the ring was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}
