//! Domain model for migrate-lat
//!
//! This module contains core domain types and errors that provide:
//! - Symbolic names for the kernel's migration enums
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{MigrateMode, MigrateReason};

pub use errors::{DecodeError, FormatParseError, TracerError};
