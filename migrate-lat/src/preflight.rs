//! Pre-flight checks for migrate-lat
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::domain::TracerError;
use crate::probe::{format_path_in, END_TRACEPOINT, START_TRACEPOINT, TRACEFS_ROOTS};

/// Minimum kernel version for `BPF_MAP_TYPE_RINGBUF`
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns the first requirement that is not met
pub fn run_preflight_checks(bpf_object: &Path) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_tracepoints(&TRACEFS_ROOTS.map(|root| Path::new(root)))?;
    check_object_exists(bpf_object)?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    // CAP_BPF + CAP_PERFMON would do, but checking them needs more than libc
    bail!(
        "Permission denied: migrate-lat requires root privileges to load eBPF programs.\n\n\
         Run with: sudo migrate-lat ..."
    );
}

/// `(major, minor)` from a `/proc/version` line
///
/// `Linux version 6.1.0-arch1-1 ...` gives `(6, 1)`.
fn parse_kernel_version(version_str: &str) -> Option<(u32, u32)> {
    let release = version_str.split_whitespace().nth(2)?;
    let mut parts = release.split('.');

    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // Can't parse, assume it's fine
    let Some((major, minor)) = parse_kernel_version(&version_str) else {
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             migrate-lat requires Linux {}.{} or newer for eBPF ring buffer support.",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// Check that both migration tracepoints exist under one of `roots`
fn check_tracepoints(roots: &[&Path]) -> Result<()> {
    for (category, name) in [START_TRACEPOINT, END_TRACEPOINT] {
        if format_path_in(roots, category, name).is_none() {
            return Err(TracerError::TracepointMissing(format!("{category}/{name}")).into());
        }
    }
    Ok(())
}

/// Check if the eBPF object has been built
fn check_object_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!(
            "eBPF object not found: {}\n\n\
             Build it with: cargo xtask build-ebpf --release\n\
             or point --bpf-object at an existing build.",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kernel_version() {
        assert_eq!(
            parse_kernel_version("Linux version 6.1.0-arch1-1 (gcc 12.2.0) #1 SMP"),
            Some((6, 1))
        );
        assert_eq!(parse_kernel_version("Linux version 5.15rc2 (x)"), Some((5, 15)));
        assert_eq!(parse_kernel_version("Linux version"), None);
        assert_eq!(parse_kernel_version("Linux version weird"), None);
    }

    #[test]
    fn test_old_kernel_is_older() {
        assert!(parse_kernel_version("Linux version 5.4.0-generic").unwrap() < MIN_KERNEL_VERSION);
        assert!(parse_kernel_version("Linux version 5.10.0").unwrap() >= MIN_KERNEL_VERSION);
    }

    #[test]
    fn test_kernel_version_check() {
        // May legitimately fail on an old kernel, just must not panic
        let _ = check_kernel_version();
    }

    #[test]
    fn test_missing_tracepoint() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_tracepoints(&[dir.path()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TracerError>(),
            Some(TracerError::TracepointMissing(name)) if name == "migrate/mm_migrate_pages_start"
        ));
    }

    #[test]
    fn test_tracepoints_present() {
        let dir = tempfile::tempdir().unwrap();
        for (category, name) in [START_TRACEPOINT, END_TRACEPOINT] {
            let event_dir = dir.path().join("events").join(category).join(name);
            std::fs::create_dir_all(&event_dir).unwrap();
            std::fs::write(event_dir.join("format"), "format:\n").unwrap();
        }
        assert!(check_tracepoints(&[dir.path()]).is_ok());
    }

    #[test]
    fn test_object_not_found() {
        let err = check_object_exists(Path::new("/nonexistent/migrate-lat")).unwrap_err().to_string();
        assert!(err.contains("eBPF object not found"));
    }
}
