use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the eBPF object into target/<target>/release/migrate-lat
    BuildEbpf {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        #[arg(long)]
        release: bool,
    },
    /// Build everything and run the tracer under sudo
    Run {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        /// Arguments passed through to migrate-lat
        #[arg(last = true)]
        run_args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target, release } => build_ebpf(&target, release)?,
        Cmd::Run { target, run_args } => run(&target, &run_args)?,
    }

    Ok(())
}

fn build_ebpf(target: &str, _release: bool) -> Result<()> {
    // Always release: debug builds on recent nightlies pull in formatting
    // code (LowerHex) the BPF linker rejects.
    let mut cmd = Command::new("cargo");
    cmd.arg("+nightly")
        .arg("build")
        .arg("--package")
        .arg("migrate-lat-ebpf")
        .arg("--target")
        .arg(target)
        .arg("-Z")
        .arg("build-std=core")
        .arg("--release");

    let status = cmd.status().context("Failed to build eBPF program")?;

    if !status.success() {
        bail!("Failed to build eBPF program");
    }

    println!("✓ eBPF program built successfully");
    println!("  Target: {target}");
    println!("  Object: target/{target}/release/migrate-lat");

    Ok(())
}

fn run(target: &str, run_args: &[String]) -> Result<()> {
    build_ebpf(target, true)?;

    let status = Command::new("cargo")
        .args(["build", "--release", "--package", "migrate-lat"])
        .status()
        .context("Failed to build migrate-lat")?;
    if !status.success() {
        bail!("Failed to build migrate-lat");
    }

    let object = format!("target/{target}/release/migrate-lat");
    let status = Command::new("sudo")
        .arg("target/release/migrate-lat")
        .arg("--bpf-object")
        .arg(&object)
        .args(run_args)
        .status()
        .context("Failed to run migrate-lat")?;
    if !status.success() {
        bail!("migrate-lat exited with {status}");
    }
    Ok(())
}
