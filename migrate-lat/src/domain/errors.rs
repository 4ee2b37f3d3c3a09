//! Structured error types for migrate-lat
//!
//! Using thiserror for automatic Display implementation and error chaining.

use migrate_lat_common::LatencyEvent;
use thiserror::Error;

/// Setup failures: nothing is traced when one of these occurs
#[derive(Error, Debug)]
pub enum TracerError {
    #[error("Failed to load eBPF object {path}: {source}")]
    EbpfLoadFailed {
        path: String,
        #[source]
        source: aya::EbpfError,
    },

    #[error("eBPF program {0} not found in object")]
    ProgramNotFound(&'static str),

    #[error("eBPF map {0} not found in object")]
    MapNotFound(&'static str),

    #[error("Failed to attach {program} to {category}/{name}: {source}")]
    AttachFailed {
        program: &'static str,
        category: &'static str,
        name: &'static str,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error(
        "Tracepoint {0} not available. Is tracefs mounted and the kernel built with CONFIG_MIGRATION (5.10+)?"
    )]
    TracepointMissing(String),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),
}

/// A raw ring buffer record that cannot be turned into a sample
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record is {actual} bytes, expected {}", LatencyEvent::SIZE)]
    Length { actual: usize },
}

/// Failure to read field offsets out of a tracefs `format` file
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatParseError {
    #[error("field {0} not present in tracepoint format")]
    MissingField(&'static str),

    #[error("field {field} is {actual} bytes, expected {expected}")]
    FieldSize { field: &'static str, expected: u32, actual: u32 },

    #[error("malformed format line: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Length { actual: 12 };
        assert_eq!(err.to_string(), "record is 12 bytes, expected 56");
    }

    #[test]
    fn test_field_size_error() {
        let err = FormatParseError::FieldSize { field: "succeeded", expected: 8, actual: 4 };
        assert!(err.to_string().contains("succeeded"));
        assert!(err.to_string().contains("expected 8"));
    }
}
