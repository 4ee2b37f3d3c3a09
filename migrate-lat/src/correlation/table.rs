//! Start-event table
//!
//! Bounded map from [`CorrelationKey`] to the monotonic timestamp of the
//! last start event seen for that key. Userspace counterpart of the kernel
//! `STARTS` LRU hash.
//!
//! # Design
//!
//! Entries are spread over [`SHARD_COUNT`] independent `Mutex<HashMap>`
//! shards, each padded to its own cache line pair, so producers working on
//! unrelated keys never touch the same lock. Each shard holds at most
//! `capacity / SHARD_COUNT` entries.
//!
//! # Eviction
//!
//! Inserting a *new* key into a full shard evicts the shard's oldest start
//! (smallest timestamp). Replacing an existing key never evicts.

use migrate_lat_common::{CorrelationKey, START_TABLE_CAPACITY};
use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of shards. Power of 2 for fast modulo.
pub const SHARD_COUNT: usize = 64;

/// A recorded start event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartEntry {
    pub key: CorrelationKey,
    /// Monotonic nanoseconds
    pub timestamp: u64,
}

/// 128-byte alignment prevents false sharing between adjacent shards.
#[repr(align(128))]
struct Shard {
    map: Mutex<HashMap<CorrelationKey, u64>>,
}

impl Shard {
    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationKey, u64>> {
        // A panic while holding the lock cannot leave a half-written u64 behind
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Concurrent, bounded start-timestamp table
pub struct StartTable {
    shards: Box<[Shard]>,
    shard_capacity: usize,
    hasher: RandomState,
    evicted: AtomicU64,
}

impl StartTable {
    /// Create a table holding up to `capacity` live entries
    ///
    /// The capacity is rounded up to a multiple of [`SHARD_COUNT`].
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let shard_capacity = capacity.div_ceil(SHARD_COUNT).max(1);
        let shards = (0..SHARD_COUNT)
            .map(|_| Shard { map: Mutex::new(HashMap::with_capacity(shard_capacity)) })
            .collect();
        Self { shards, shard_capacity, hasher: RandomState::new(), evicted: AtomicU64::new(0) }
    }

    /// Total number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shard_capacity * SHARD_COUNT
    }

    /// Insert or replace the start timestamp for `key`
    ///
    /// Last start wins: an unresolved earlier start for the same key is
    /// discarded.
    pub fn record_start(&self, key: CorrelationKey, timestamp: u64) {
        let mut map = self.shard(&key).lock();

        if map.len() >= self.shard_capacity && !map.contains_key(&key) {
            let oldest = map.iter().min_by_key(|(_, ts)| **ts).map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                map.remove(&oldest);
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }

        map.insert(key, timestamp);
    }

    /// Remove and return the start entry for `key`
    ///
    /// `None` means no start was recorded (or it was evicted); callers treat
    /// that as "nothing to report", not as an error.
    pub fn take_and_remove(&self, key: &CorrelationKey) -> Option<StartEntry> {
        self.shard(key).lock().remove(key).map(|timestamp| StartEntry { key: *key, timestamp })
    }

    /// Number of live entries (racy under concurrent mutation)
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries discarded to make room for new keys
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard(&self, key: &CorrelationKey) -> &Shard {
        let index = (self.hasher.hash_one(key) as usize) & (SHARD_COUNT - 1);
        &self.shards[index]
    }
}

impl Default for StartTable {
    fn default() -> Self {
        Self::with_capacity(START_TABLE_CAPACITY as usize)
    }
}

impl std::fmt::Debug for StartTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartTable")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("evicted", &self.evicted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tid: u32) -> CorrelationKey {
        CorrelationKey::new(tid, 0)
    }

    #[test]
    fn test_take_removes_exactly_once() {
        let table = StartTable::default();
        table.record_start(key(1), 500);

        assert_eq!(table.take_and_remove(&key(1)), Some(StartEntry { key: key(1), timestamp: 500 }));
        assert_eq!(table.take_and_remove(&key(1)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_key_is_absent() {
        let table = StartTable::default();
        assert_eq!(table.take_and_remove(&key(9)), None);
    }

    #[test]
    fn test_last_start_wins() {
        let table = StartTable::default();
        table.record_start(key(1), 100);
        table.record_start(key(1), 300);

        assert_eq!(table.len(), 1);
        assert_eq!(table.take_and_remove(&key(1)).map(|e| e.timestamp), Some(300));
        assert_eq!(table.evicted(), 0);
    }

    #[test]
    fn test_full_table_evicts_oldest() {
        // One slot per shard
        let table = StartTable::with_capacity(SHARD_COUNT);
        assert_eq!(table.capacity(), SHARD_COUNT);

        let keys: Vec<_> = (0..10_000u32).map(key).collect();
        for (ts, k) in keys.iter().enumerate() {
            table.record_start(*k, ts as u64);
        }

        assert!(table.len() <= SHARD_COUNT);
        assert_eq!(table.evicted() as usize, keys.len() - table.len());

        // The most recent start always survives
        let last = keys[keys.len() - 1];
        assert_eq!(table.take_and_remove(&last).map(|e| e.timestamp), Some(9_999));
        // The very first start was evicted long ago
        assert_eq!(table.take_and_remove(&keys[0]), None);
    }

    #[test]
    fn test_replace_in_full_shard_does_not_evict() {
        let table = StartTable::with_capacity(SHARD_COUNT);
        table.record_start(key(1), 1);
        table.record_start(key(1), 2);
        assert_eq!(table.evicted(), 0);
    }

    #[test]
    fn test_racing_start_and_take_on_one_key() {
        use std::sync::atomic::AtomicBool;

        const WRITES: u64 = 50_000;
        let table = StartTable::default();
        let writer_done = AtomicBool::new(false);
        let k = CorrelationKey::new(77, 4242);

        let taken = std::thread::scope(|s| {
            s.spawn(|| {
                for ts in 1..=WRITES {
                    table.record_start(k, ts);
                }
                writer_done.store(true, Ordering::Release);
            });

            let mut taken = Vec::new();
            loop {
                let done = writer_done.load(Ordering::Acquire);
                if let Some(entry) = table.take_and_remove(&k) {
                    assert_eq!(entry.key, k);
                    taken.push(entry.timestamp);
                }
                if done {
                    break;
                }
            }
            taken.extend(table.take_and_remove(&k).map(|e| e.timestamp));
            taken
        });

        // Every timestamp was written by the writer, and none was taken twice
        assert!(taken.iter().all(|ts| (1..=WRITES).contains(ts)));
        assert!(taken.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(taken.last(), Some(&WRITES));
        assert!(table.is_empty());
        assert_eq!(table.evicted(), 0);
    }
}
