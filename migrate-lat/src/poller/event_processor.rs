//! # Record Decoding and Filtering
//!
//! Turns raw ring buffer records into [`LatencySample`]s and decides which
//! ones get reported.
//!
//! Both steps are pure functions of the record bytes: a record that fails
//! to decode or does not pass the filter has no effect beyond a counter.

use migrate_lat_common::{LatencyEvent, TASK_COMM_LEN};
use serde::Serialize;

use crate::correlation::comm_bytes;
use crate::domain::DecodeError;

/// A decoded latency sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencySample {
    /// Command name up to the first NUL, lossily decoded
    pub comm: String,
    pub pid: u32,
    pub delta_ns: u64,
    pub pages_ok: u64,
    pub pages_failed: u64,
    pub mode: u32,
    pub reason: u32,
    /// The comm exactly as it crossed the wire, for fixed-length matching
    #[serde(skip)]
    pub raw_comm: [u8; TASK_COMM_LEN],
}

impl LatencySample {
    /// Latency in milliseconds, for display
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn latency_ms(&self) -> f64 {
        self.delta_ns as f64 / 1_000_000.0
    }
}

impl From<LatencyEvent> for LatencySample {
    fn from(event: LatencyEvent) -> Self {
        let end = event.comm.iter().position(|&b| b == 0).unwrap_or(TASK_COMM_LEN);
        Self {
            comm: String::from_utf8_lossy(&event.comm[..end]).into_owned(),
            pid: event.pid,
            delta_ns: event.delta_ns,
            pages_ok: event.pages_ok,
            pages_failed: event.pages_failed,
            mode: event.mode,
            reason: event.reason,
            raw_comm: event.comm,
        }
    }
}

/// Decode one raw record
///
/// # Errors
/// [`DecodeError::Length`] when the record is not exactly one `LatencyEvent`.
pub fn decode(bytes: &[u8]) -> Result<LatencySample, DecodeError> {
    LatencyEvent::from_bytes(bytes)
        .map(LatencySample::from)
        .ok_or(DecodeError::Length { actual: bytes.len() })
}

/// Case-sensitive, fixed-length command name match
///
/// The pattern is truncated the way the kernel truncates comm (15 bytes).
/// A sample matches when its comm starts with the pattern *and* ends where
/// the pattern ends, so `migratepages` does not match `migratepages2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommPattern {
    bytes: [u8; TASK_COMM_LEN],
    len: usize,
}

impl CommPattern {
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let bytes = comm_bytes(pattern);
        let len = pattern.len().min(TASK_COMM_LEN - 1);
        Self { bytes, len }
    }

    #[must_use]
    pub fn matches(&self, comm: &[u8; TASK_COMM_LEN]) -> bool {
        comm[..self.len] == self.bytes[..self.len]
            && (self.len == TASK_COMM_LEN - 1 || comm[self.len] == 0)
    }
}

/// Which samples to report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFilter {
    pub pid: Option<u32>,
    pub comm: Option<CommPattern>,
}

impl SampleFilter {
    #[must_use]
    pub fn new(pid: Option<u32>, comm: Option<&str>) -> Self {
        Self { pid, comm: comm.map(CommPattern::new) }
    }

    #[must_use]
    pub fn accepts(&self, sample: &LatencySample) -> bool {
        self.pid.map_or(true, |pid| sample.pid == pid)
            && self.comm.map_or(true, |pattern| pattern.matches(&sample.raw_comm))
    }
}
