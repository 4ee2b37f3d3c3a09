//! Sample rendering: fixed-width text lines or one JSON object per line

use serde::Serialize;
use std::io::{self, Write};

use super::LatencySample;
use crate::domain::{MigrateMode, MigrateReason};

/// How samples are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Column header for text output
#[must_use]
pub fn header() -> String {
    format!(
        "{:<16} {:<6} {:<11} {:<9} {:<9} {:<6} {:<6}",
        "COMM", "PID", "LAT(ms)", "OK", "FAIL", "MODE", "RSN"
    )
}

/// One text line for a sample
#[must_use]
pub fn format_line(sample: &LatencySample) -> String {
    format!(
        "{:<16} {:<6}  {:>9.3} ms  ok={:<5}  fail={:<5}  mode={}  reason={}",
        sample.comm,
        sample.pid,
        sample.latency_ms(),
        sample.pages_ok,
        sample.pages_failed,
        sample.mode,
        sample.reason
    )
}

#[derive(Serialize)]
struct JsonLine<'a> {
    #[serde(flatten)]
    sample: &'a LatencySample,
    latency_ms: f64,
    mode_name: String,
    reason_name: String,
}

/// One JSON object for a sample, with symbolic mode and reason names
///
/// # Errors
/// Returns an error if serialization fails
pub fn format_json(sample: &LatencySample) -> serde_json::Result<String> {
    serde_json::to_string(&JsonLine {
        sample,
        latency_ms: sample.latency_ms(),
        mode_name: MigrateMode::label(sample.mode),
        reason_name: MigrateReason::label(sample.reason),
    })
}

/// Writes the header once and then one line per sample
pub struct SampleWriter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> SampleWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Header row; JSON output has none
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails
    pub fn write_header(&mut self) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{}", header()),
            OutputFormat::Json => Ok(()),
        }
    }

    /// # Errors
    /// Returns an error if the underlying writer fails
    pub fn write_sample(&mut self, sample: &LatencySample) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{}", format_line(sample)),
            OutputFormat::Json => {
                let line = format_json(sample).map_err(io::Error::other)?;
                writeln!(self.out, "{line}")
            }
        }
    }

    /// # Errors
    /// Returns an error if the underlying writer fails
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
