//! Kernel side of the tracer: locating the tracepoints, loading the eBPF
//! object, and reading its ring buffer and counters.

pub mod diagnostics;
pub mod ebpf_setup;
pub mod kernel_ring;
pub mod tracefs;

pub use diagnostics::{print_kernel_stats, read_kernel_stats, KernelStats};
pub use ebpf_setup::{
    attach_tracepoints, configure_field_offsets, init_ebpf_logger, load_ebpf_program,
    take_event_ring, DEFAULT_BPF_OBJECT,
};
pub use kernel_ring::KernelRing;
pub use tracefs::{
    discover_offsets, format_path, format_path_in, parse_format, read_offsets, MigrateFieldOffsets,
    END_TRACEPOINT, START_TRACEPOINT, TRACEFS_ROOTS,
};
