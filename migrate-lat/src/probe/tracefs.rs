//! Tracepoint format discovery
//!
//! The `mm_migrate_pages` record layout has changed across kernel versions
//! (`large_folio_split` and friends were added ahead of `mode`). Rather than
//! hardcode one layout, read the offsets out of the tracefs `format` file and
//! hand them to the eBPF program through the `CONFIG` map.

use log::{info, warn};
use migrate_lat_common::{
    DEFAULT_FAILED_OFFSET, DEFAULT_MODE_OFFSET, DEFAULT_REASON_OFFSET, DEFAULT_SUCCEEDED_OFFSET,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::FormatParseError;

/// Where tracefs is usually mounted, in order of preference
pub const TRACEFS_ROOTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Fires when `migrate_pages()` begins
pub const START_TRACEPOINT: (&str, &str) = ("migrate", "mm_migrate_pages_start");

/// Fires when `migrate_pages()` returns
pub const END_TRACEPOINT: (&str, &str) = ("migrate", "mm_migrate_pages");

/// Offsets of the completion payload inside the `mm_migrate_pages` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrateFieldOffsets {
    pub succeeded: u32,
    pub failed: u32,
    pub mode: u32,
    pub reason: u32,
}

impl Default for MigrateFieldOffsets {
    fn default() -> Self {
        Self {
            succeeded: DEFAULT_SUCCEEDED_OFFSET,
            failed: DEFAULT_FAILED_OFFSET,
            mode: DEFAULT_MODE_OFFSET,
            reason: DEFAULT_REASON_OFFSET,
        }
    }
}

/// Path of a tracepoint's `format` file under the first tracefs root that has it
#[must_use]
pub fn format_path(category: &str, name: &str) -> Option<PathBuf> {
    let roots = TRACEFS_ROOTS.map(|root| Path::new(root));
    format_path_in(&roots, category, name)
}

/// Same as [`format_path`], searching `roots` instead of the usual mounts
#[must_use]
pub fn format_path_in(roots: &[&Path], category: &str, name: &str) -> Option<PathBuf> {
    roots
        .iter()
        .map(|root| root.join("events").join(category).join(name).join("format"))
        .find(|path| path.exists())
}

/// Parse the payload offsets out of the `mm_migrate_pages` format text
///
/// # Errors
/// - A required field is absent
/// - A required field has an unexpected size
/// - A `field:` line cannot be parsed
pub fn parse_format(text: &str) -> Result<MigrateFieldOffsets, FormatParseError> {
    let mut fields: HashMap<&str, (u32, u32)> = HashMap::new();

    for line in text.lines().map(str::trim).filter(|l| l.starts_with("field:")) {
        let (name, offset, size) =
            parse_field_line(line).ok_or_else(|| FormatParseError::Malformed(line.to_string()))?;
        fields.insert(name, (offset, size));
    }

    let lookup = |field: &'static str, expected: u32| -> Result<u32, FormatParseError> {
        let &(offset, actual) = fields.get(field).ok_or(FormatParseError::MissingField(field))?;
        if actual != expected {
            return Err(FormatParseError::FieldSize { field, expected, actual });
        }
        Ok(offset)
    };

    Ok(MigrateFieldOffsets {
        succeeded: lookup("succeeded", 8)?,
        failed: lookup("failed", 8)?,
        mode: lookup("mode", 4)?,
        reason: lookup("reason", 4)?,
    })
}

/// `field:unsigned long succeeded;\toffset:8;\tsize:8;\tsigned:0;`
fn parse_field_line(line: &str) -> Option<(&str, u32, u32)> {
    let mut parts = line.split(';').map(str::trim);

    let decl = parts.next()?.strip_prefix("field:")?;
    let name = decl.split_whitespace().last()?;
    let name = name.split('[').next()?;

    let offset = parts.next()?.strip_prefix("offset:")?.parse().ok()?;
    let size = parts.next()?.strip_prefix("size:")?.parse().ok()?;
    Some((name, offset, size))
}

/// Read offsets from a format file
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub fn read_offsets(path: &Path) -> anyhow::Result<MigrateFieldOffsets> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_format(&text)?)
}

/// Offsets for the running kernel, or the built-in defaults if discovery fails
#[must_use]
pub fn discover_offsets() -> MigrateFieldOffsets {
    let (category, name) = END_TRACEPOINT;
    let Some(path) = format_path(category, name) else {
        warn!("No tracefs format for {category}/{name}, using default field offsets");
        return MigrateFieldOffsets::default();
    };

    match read_offsets(&path) {
        Ok(offsets) => {
            info!("✓ Field offsets from {}: {offsets:?}", path.display());
            offsets
        }
        Err(e) => {
            warn!("Failed to parse {}: {e}. Using default field offsets", path.display());
            MigrateFieldOffsets::default()
        }
    }
}
