//! # eBPF Program Loading and Attachment
//!
//! Loads compiled eBPF bytecode and attaches programs to kernel hook points.
//!
//! ## Functions
//!
//! - [`load_ebpf_program()`] - Load eBPF bytecode from the built object file
//! - [`configure_field_offsets()`] - Publish tracepoint offsets into `CONFIG`
//! - [`take_event_ring()`] - Take the `EVENTS` ring buffer for polling
//! - [`attach_tracepoints()`] - Attach completion, then start
//!
//! ## Attachment Points
//!
//! - **Tracepoint**: `migrate/mm_migrate_pages` (completion)
//! - **Tracepoint**: `migrate/mm_migrate_pages_start` (start)

use aya::{
    maps::{Array, RingBuf},
    programs::TracePoint,
    Ebpf,
};
use aya_log::EbpfLogger;
use log::{info, warn};
use migrate_lat_common::{
    CONFIG_OFFSET_FAILED, CONFIG_OFFSET_MODE, CONFIG_OFFSET_REASON, CONFIG_OFFSET_SUCCEEDED,
};
use std::path::Path;

use super::tracefs::{MigrateFieldOffsets, END_TRACEPOINT, START_TRACEPOINT};
use super::KernelRing;
use crate::domain::TracerError;

/// Release build of `migrate-lat-ebpf`, produced by `cargo xtask build-ebpf`
pub const DEFAULT_BPF_OBJECT: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/../target/bpfel-unknown-none/release/migrate-lat");

/// Load the eBPF object file
///
/// Always the release build: debug builds pull in formatting code the BPF
/// linker rejects.
///
/// # Errors
/// Returns an error if the object cannot be read or the kernel rejects it
pub fn load_ebpf_program(path: &Path) -> Result<Ebpf, TracerError> {
    let bpf = Ebpf::load_file(path).map_err(|source| TracerError::EbpfLoadFailed {
        path: path.display().to_string(),
        source,
    })?;
    info!("✓ Loaded eBPF object {}", path.display());
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Write the `mm_migrate_pages` payload offsets into the `CONFIG` map
///
/// # Errors
/// Returns an error if the map is missing or cannot be updated
pub fn configure_field_offsets(
    bpf: &mut Ebpf,
    offsets: &MigrateFieldOffsets,
) -> Result<(), TracerError> {
    let mut config: Array<_, u32> =
        Array::try_from(bpf.map_mut("CONFIG").ok_or(TracerError::MapNotFound("CONFIG"))?)?;

    config.set(CONFIG_OFFSET_SUCCEEDED, offsets.succeeded, 0)?;
    config.set(CONFIG_OFFSET_FAILED, offsets.failed, 0)?;
    config.set(CONFIG_OFFSET_MODE, offsets.mode, 0)?;
    config.set(CONFIG_OFFSET_REASON, offsets.reason, 0)?;
    Ok(())
}

/// Take ownership of the `EVENTS` ring buffer
///
/// # Errors
/// Returns an error if the map is missing or is not a ring buffer
pub fn take_event_ring(bpf: &mut Ebpf) -> Result<KernelRing, TracerError> {
    let map = bpf.take_map("EVENTS").ok_or(TracerError::MapNotFound("EVENTS"))?;
    Ok(KernelRing::new(RingBuf::try_from(map)?))
}

/// Attach both tracepoints
///
/// Completion goes first: a start recorded before the completion hook is
/// live would otherwise sit in the table until evicted.
///
/// # Errors
/// Returns an error if a program is missing, fails verification, or cannot attach
pub fn attach_tracepoints(bpf: &mut Ebpf) -> Result<(), TracerError> {
    attach_tracepoint(bpf, "migrate_pages_end", END_TRACEPOINT)?;
    attach_tracepoint(bpf, "migrate_pages_start", START_TRACEPOINT)?;
    Ok(())
}

fn attach_tracepoint(
    bpf: &mut Ebpf,
    program_name: &'static str,
    (category, name): (&'static str, &'static str),
) -> Result<(), TracerError> {
    let program: &mut TracePoint = bpf
        .program_mut(program_name)
        .ok_or(TracerError::ProgramNotFound(program_name))?
        .try_into()?;
    program.load()?;
    program.attach(category, name).map_err(|source| TracerError::AttachFailed {
        program: program_name,
        category,
        name,
        source,
    })?;
    info!("✓ Attached tracepoint: {category}/{name}");
    Ok(())
}
