//! # migrate-lat - eBPF Page Migration Latency Tracer
//!
//! Measures how long each call to the kernel's `migrate_pages()` takes, per
//! task, and reports one sample per completed migration.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Programs (Kernel)                      │
//! │  • migrate/mm_migrate_pages_start → STARTS[tid, cgroup] = now   │
//! │  • migrate/mm_migrate_pages       → take start, emit sample     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ EVENTS ring buffer (56-byte records)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    migrate-lat (This Crate)                     │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │    Probe     │──▶│    Poller    │──▶│   Display    │         │
//! │  │ (load/attach)│   │ decode/filter│   │ text / NDJSON│         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`probe`]: tracefs offset discovery, eBPF loading and attachment,
//!   the kernel ring buffer source, per-CPU counters
//! - [`poller`]: the consumer loop with record decoding, filtering and rendering
//! - [`correlation`]: start table and completion handling, the same
//!   algorithm the kernel side runs, usable and testable without a kernel
//! - [`channel`]: bounded lossy record channel for the in-process tracer
//! - [`domain`]: migrate mode/reason codes and error types
//! - [`cli`]: command-line arguments
//! - [`preflight`]: privilege, kernel and tracepoint checks
//!
//! ## Typical Usage
//!
//! ```bash
//! cargo xtask build-ebpf --release
//! sudo ./target/release/migrate-lat --comm migratepages
//! ```

pub mod channel;
pub mod cli;
pub mod correlation;
pub mod domain;
pub mod poller;
pub mod preflight;
pub mod probe;
