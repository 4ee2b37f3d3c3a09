//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::poller::{OutputFormat, PollerConfig, SampleFilter};

#[derive(Parser, Debug)]
#[command(
    name = "migrate-lat",
    version,
    about = "Measure page migration latency with eBPF",
    after_help = "\
EXAMPLES:
    sudo migrate-lat                              Every migration, system wide
    sudo migrate-lat --comm migratepages          Only the migratepages tool
    sudo migrate-lat --pid 1234 --json            One process, NDJSON output
    sudo migrate-lat --duration 30 --quiet        Stop after 30s, no summary"
)]
pub struct Args {
    /// Only report migrations by this process (tgid)
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Only report migrations by tasks with exactly this command name
    #[arg(short, long, value_name = "NAME")]
    pub comm: Option<String>,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// One JSON object per line instead of the text table
    #[arg(long)]
    pub json: bool,

    /// Ring buffer poll timeout
    #[arg(long, value_name = "MS", default_value = "100")]
    pub timeout_ms: u64,

    /// Compiled eBPF object (defaults to the workspace release build)
    #[arg(long, value_name = "FILE")]
    pub bpf_object: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            filter: SampleFilter::new(self.pid, self.comm.as_deref()),
            duration: (self.duration > 0).then(|| Duration::from_secs(self.duration)),
        }
    }

    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::comm_bytes;
    use crate::poller::CommPattern;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["migrate-lat"]).unwrap();
        let config = args.poller_config();
        assert_eq!(config.timeout, Duration::from_millis(100));
        assert_eq!(config.duration, None);
        assert_eq!(config.filter, SampleFilter::default());
        assert_eq!(args.output_format(), OutputFormat::Text);
    }

    #[test]
    fn test_filters_and_json() {
        let args = Args::try_parse_from([
            "migrate-lat",
            "-p",
            "42",
            "--comm",
            "migratepages",
            "--duration",
            "5",
            "--json",
        ])
        .unwrap();
        let config = args.poller_config();
        assert_eq!(config.filter.pid, Some(42));
        assert!(config.filter.comm.is_some_and(|p| p == CommPattern::new("migratepages")));
        assert!(config.filter.comm.is_some_and(|p| p.matches(&comm_bytes("migratepages"))));
        assert_eq!(config.duration, Some(Duration::from_secs(5)));
        assert_eq!(args.output_format(), OutputFormat::Json);
    }

    #[test]
    fn test_rejects_bad_pid() {
        assert!(Args::try_parse_from(["migrate-lat", "--pid", "abc"]).is_err());
    }
}
