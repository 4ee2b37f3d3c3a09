//! # Event Poller
//!
//! Single-threaded consumer loop: poll the delivery channel, decode each
//! record, filter, render.
//!
//! ## Lifecycle
//!
//! `Init → Running → Draining → Stopped`
//!
//! Stop is cooperative. Whoever receives SIGINT/SIGTERM only sets the
//! [`StopFlag`]; the loop checks it before each poll, so the poll iteration
//! in flight always completes and its records are written out.

pub mod event_display;
pub mod event_processor;

use log::debug;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::RingConsumer;

pub use event_display::{format_json, format_line, header, OutputFormat, SampleWriter};
pub use event_processor::{decode, CommPattern, LatencySample, SampleFilter};

/// Default wait per poll call
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Anything that hands out raw latency records
pub trait EventSource {
    /// Wait up to `timeout` for records and pass each one to `on_record`,
    /// in the order they were published. Returns the number of records seen.
    ///
    /// # Errors
    /// Only for failures of the channel itself; an interrupted wait is not one.
    fn poll(&mut self, timeout: Duration, on_record: &mut dyn FnMut(&[u8])) -> io::Result<usize>;
}

impl EventSource for RingConsumer {
    fn poll(&mut self, timeout: Duration, on_record: &mut dyn FnMut(&[u8])) -> io::Result<usize> {
        let records = RingConsumer::poll(self, timeout);
        for record in &records {
            on_record(record);
        }
        Ok(records.len())
    }
}

/// Cooperative stop request, safe to set from a signal-handling task
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Init,
    Running,
    Draining,
    Stopped,
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Interrupted,
    DurationLimit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupted => "interrupted",
            Self::DurationLimit => "duration limit reached",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub timeout: Duration,
    pub filter: SampleFilter,
    /// Stop on its own after this long
    pub duration: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { timeout: DEFAULT_POLL_TIMEOUT, filter: SampleFilter::default(), duration: None }
    }
}

/// Counters for one poller run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub received: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub rendered: u64,
}

pub struct Poller {
    config: PollerConfig,
    stop: StopFlag,
    state: PollerState,
    summary: PollSummary,
}

impl Poller {
    #[must_use]
    pub fn new(config: PollerConfig, stop: StopFlag) -> Self {
        Self { config, stop, state: PollerState::Init, summary: PollSummary::default() }
    }

    #[must_use]
    pub fn state(&self) -> PollerState {
        self.state
    }

    #[must_use]
    pub fn summary(&self) -> PollSummary {
        self.summary
    }

    /// Run until stopped, writing accepted samples to `out`
    ///
    /// # Errors
    /// Returns an error if the source fails or `out` cannot be written
    pub fn run<S, W>(&mut self, source: &mut S, out: &mut SampleWriter<W>) -> io::Result<ExitReason>
    where
        S: EventSource + ?Sized,
        W: Write,
    {
        self.state = PollerState::Running;
        out.write_header()?;
        out.flush()?;

        let started = Instant::now();
        let timeout = self.config.timeout;

        let reason = loop {
            if self.stop.is_requested() {
                break ExitReason::Interrupted;
            }
            if self.config.duration.is_some_and(|limit| started.elapsed() >= limit) {
                break ExitReason::DurationLimit;
            }

            let mut write_error = None;
            source.poll(timeout, &mut |bytes: &[u8]| {
                if write_error.is_none() {
                    if let Err(e) = self.handle_record(bytes, out) {
                        write_error = Some(e);
                    }
                }
            })?;
            if let Some(e) = write_error {
                return Err(e);
            }
            out.flush()?;
        };

        self.state = PollerState::Draining;
        out.flush()?;
        self.state = PollerState::Stopped;
        Ok(reason)
    }

    fn handle_record<W: Write>(
        &mut self,
        bytes: &[u8],
        out: &mut SampleWriter<W>,
    ) -> io::Result<()> {
        self.summary.received += 1;

        let sample = match decode(bytes) {
            Ok(sample) => sample,
            Err(e) => {
                self.summary.malformed += 1;
                debug!("Discarding record: {e}");
                return Ok(());
            }
        };

        if !self.config.filter.accepts(&sample) {
            self.summary.filtered += 1;
            return Ok(());
        }

        out.write_sample(&sample)?;
        self.summary.rendered += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted batches, then requests stop
    struct Scripted {
        batches: VecDeque<Vec<Vec<u8>>>,
        stop: StopFlag,
    }

    impl EventSource for Scripted {
        fn poll(&mut self, _: Duration, on_record: &mut dyn FnMut(&[u8])) -> io::Result<usize> {
            let Some(batch) = self.batches.pop_front() else {
                self.stop.request();
                return Ok(0);
            };
            for record in &batch {
                on_record(record);
            }
            Ok(batch.len())
        }
    }

    fn record(comm: &str, pid: u32) -> Vec<u8> {
        let mut event = migrate_lat_common::LatencyEvent::from_bytes(
            &[0u8; migrate_lat_common::LatencyEvent::SIZE],
        )
        .unwrap();
        event.comm = crate::correlation::comm_bytes(comm);
        event.pid = pid;
        event.to_bytes().to_vec()
    }

    #[test]
    fn test_stop_before_first_poll() {
        let stop = StopFlag::new();
        stop.request();
        let mut poller = Poller::new(PollerConfig::default(), stop.clone());
        let mut source = Scripted { batches: VecDeque::from([vec![record("a", 1)]]), stop };
        let mut out = SampleWriter::new(Vec::new(), OutputFormat::Text);

        assert_eq!(poller.state(), PollerState::Init);
        assert_eq!(poller.run(&mut source, &mut out).unwrap(), ExitReason::Interrupted);
        assert_eq!(poller.state(), PollerState::Stopped);
        assert_eq!(poller.summary().received, 0);
    }

    #[test]
    fn test_malformed_record_does_not_stop_loop() {
        let stop = StopFlag::new();
        let mut poller = Poller::new(PollerConfig::default(), stop.clone());
        let batches = VecDeque::from([
            vec![vec![1, 2, 3], record("kcompactd0", 30)],
            vec![record("migratepages", 31)],
        ]);
        let mut source = Scripted { batches, stop };
        let mut out = SampleWriter::new(Vec::new(), OutputFormat::Text);

        poller.run(&mut source, &mut out).unwrap();

        let summary = poller.summary();
        assert_eq!(summary, PollSummary { received: 3, malformed: 1, filtered: 0, rendered: 2 });
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_filter_counts_rejections() {
        let stop = StopFlag::new();
        let config = PollerConfig { filter: SampleFilter::new(Some(31), None), ..Default::default() };
        let mut poller = Poller::new(config, stop.clone());
        let batches = VecDeque::from([vec![record("a", 30), record("b", 31), record("c", 32)]]);
        let mut source = Scripted { batches, stop };
        let mut out = SampleWriter::new(Vec::new(), OutputFormat::Text);

        poller.run(&mut source, &mut out).unwrap();
        assert_eq!(poller.summary().filtered, 2);
        assert_eq!(poller.summary().rendered, 1);
    }

    #[test]
    fn test_duration_limit() {
        let config = PollerConfig {
            timeout: Duration::from_millis(1),
            duration: Some(Duration::ZERO),
            ..Default::default()
        };
        let stop = StopFlag::new();
        let mut poller = Poller::new(config, stop.clone());
        let mut source = Scripted { batches: VecDeque::new(), stop };
        let mut out = SampleWriter::new(Vec::new(), OutputFormat::Json);

        assert_eq!(poller.run(&mut source, &mut out).unwrap(), ExitReason::DurationLimit);
    }
}
