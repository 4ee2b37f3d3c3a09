//! # migrate-lat - Main Entry Point
//!
//! Load and attach the probes, then poll the ring buffer on a blocking
//! thread until Ctrl+C, SIGTERM or `--duration` runs out.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Instant;
use tokio::signal::unix::{signal, SignalKind};

use migrate_lat::cli::Args;
use migrate_lat::poller::{Poller, SampleWriter, StopFlag};
use migrate_lat::preflight::run_preflight_checks;
use migrate_lat::probe::{
    attach_tracepoints, configure_field_offsets, discover_offsets, init_ebpf_logger,
    load_ebpf_program, print_kernel_stats, read_kernel_stats, take_event_ring,
    DEFAULT_BPF_OBJECT,
};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if err.downcast_ref::<clap::Error>().is_some() {
        // Only clap errors are usage errors
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Set `stop` on the first SIGINT or SIGTERM
async fn forward_shutdown_signals(stop: StopFlag) {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
    stop.request();
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let object = args.bpf_object.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_BPF_OBJECT));
    run_preflight_checks(&object)?;

    if !quiet {
        eprintln!("migrate-lat v{}", env!("CARGO_PKG_VERSION"));
    }

    let mut bpf = load_ebpf_program(&object)?;
    init_ebpf_logger(&mut bpf);

    let offsets = discover_offsets();
    configure_field_offsets(&mut bpf, &offsets)?;
    let ring = take_event_ring(&mut bpf)?;
    attach_tracepoints(&mut bpf)?;

    if !quiet {
        eprintln!("Tracing page migrations... Ctrl+C to stop.");
    }

    let stop = StopFlag::new();
    tokio::spawn(forward_shutdown_signals(stop.clone()));

    let config = args.poller_config();
    let format = args.output_format();
    let started = Instant::now();

    let (exit_reason, summary) = tokio::task::spawn_blocking(move || -> io::Result<_> {
        let mut ring = ring;
        let mut poller = Poller::new(config, stop);
        let mut out = SampleWriter::new(BufWriter::new(io::stdout().lock()), format);
        let reason = poller.run(&mut ring, &mut out)?;
        Ok((reason, poller.summary()))
    })
    .await
    .context("poller thread panicked")?
    .context("event loop failed")?;

    info!("Poller stopped: {exit_reason}");

    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} samples ({} received, {} filtered, {} malformed)",
            exit_reason,
            started.elapsed().as_secs_f64(),
            summary.rendered,
            summary.received,
            summary.filtered,
            summary.malformed,
        );
        match read_kernel_stats(&bpf) {
            Ok(stats) => print_kernel_stats(&stats),
            Err(e) => warn!("Failed to read kernel counters: {e}"),
        }
    }

    Ok(())
}
