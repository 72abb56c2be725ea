//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Launch mode (default) - spawn one process per participant on this host
    Launch,
    /// Participant mode - run the single role selected by --rank
    Participant,
    /// In-process mode - run every role as a task inside one process
    InProcess,
}

/// Widget Report - distributed per-model sales report generator
#[derive(Parser, Debug)]
#[command(name = "widget-report")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Record file to report on
    ///
    /// Only read by the coordinator (rank 0)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Year selected by the per-year column
    ///
    /// Parsed against the accepted year range when the configuration is loaded
    #[arg(value_name = "REPORT_YEAR", allow_negative_numbers = true)]
    pub report_year: Option<String>,

    /// Customer type selected by the per-type column
    #[arg(value_name = "CUSTOMER_TYPE")]
    pub customer_type: Option<String>,

    /// Execution mode: launch, participant, or in-process
    #[arg(long, value_enum, default_value = "launch")]
    pub mode: ExecutionMode,

    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Cluster Options ===
    /// Total number of processes (coordinator + error sink + workers)
    #[arg(short = 'n', long, env = "WIDGET_REPORT_WORLD_SIZE")]
    pub world_size: Option<usize>,

    /// Rank of this process (participant mode only)
    #[arg(long, env = "WIDGET_REPORT_RANK")]
    pub rank: Option<usize>,

    /// Coordinator listen address (participant mode only)
    #[arg(long)]
    pub coordinator_addr: Option<SocketAddr>,

    /// Error sink listen address (participant mode only)
    #[arg(long)]
    pub sink_addr: Option<SocketAddr>,

    /// Host to bind listeners on (launch mode)
    #[arg(long)]
    pub bind_host: Option<String>,

    /// Seconds to keep retrying connections to the coordinator and error sink
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    // === Validation Options ===
    /// Earliest accepted purchase year
    #[arg(long, allow_negative_numbers = true)]
    pub min_year: Option<i32>,

    /// Latest accepted purchase year
    #[arg(long, allow_negative_numbers = true)]
    pub max_year: Option<i32>,

    /// Accepted customer types as one string (e.g., "IRG")
    #[arg(long)]
    pub customer_types: Option<String>,

    // === Output Options ===
    /// Also write the report as JSON
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Also write the report as CSV
    #[arg(long)]
    pub csv_output: Option<PathBuf>,

    /// Do not print the report table
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// Errors are returned rather than exiting, so the caller picks the status.
    pub fn parse_args() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Validate mode-specific argument combinations
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode == ExecutionMode::Participant {
            let rank = self
                .rank
                .ok_or_else(|| anyhow::anyhow!("--rank is required in participant mode"))?;

            if self.coordinator_addr.is_none() && rank != 1 {
                anyhow::bail!("--coordinator-addr is required in participant mode");
            }
            if self.sink_addr.is_none() {
                anyhow::bail!("--sink-addr is required in participant mode");
            }
        } else if self.rank.is_some() {
            anyhow::bail!("--rank is only valid in participant mode");
        }

        if let Some(ref types) = self.customer_types {
            if types.trim().is_empty() {
                anyhow::bail!("--customer-types must list at least one type");
            }
        }

        Ok(())
    }

    /// Accepted customer types parsed from `--customer-types`
    pub fn customer_type_list(&self) -> Option<Vec<char>> {
        self.customer_types
            .as_ref()
            .map(|s| s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_positional_arguments() {
        let cli = parse(&["widget-report", "data.txt", "2010", "I"]);
        assert_eq!(cli.path, Some(PathBuf::from("data.txt")));
        assert_eq!(cli.report_year.as_deref(), Some("2010"));
        assert_eq!(cli.customer_type.as_deref(), Some("I"));
        assert_eq!(cli.mode, ExecutionMode::Launch);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_report_targets_accept_any_text() {
        // Checked later against the validation domains, not by clap
        let cli = parse(&["widget-report", "data.txt", "20x0", "IR"]);
        assert_eq!(cli.report_year.as_deref(), Some("20x0"));
        assert_eq!(cli.customer_type.as_deref(), Some("IR"));

        let cli = parse(&["widget-report", "data.txt", "-5", "I"]);
        assert_eq!(cli.report_year.as_deref(), Some("-5"));
    }

    #[test]
    fn test_participant_requires_rank() {
        let cli = parse(&["widget-report", "--mode", "participant", "--sink-addr", "127.0.0.1:7000"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_participant_worker() {
        let cli = parse(&[
            "widget-report",
            "--mode",
            "participant",
            "--rank",
            "3",
            "--world-size",
            "5",
            "--coordinator-addr",
            "127.0.0.1:7000",
            "--sink-addr",
            "127.0.0.1:7001",
        ]);
        assert!(cli.validate().is_ok());
        assert_eq!(cli.rank, Some(3));
        assert_eq!(cli.world_size, Some(5));
    }

    #[test]
    fn test_rank_outside_participant_mode() {
        let cli = parse(&["widget-report", "data.txt", "2010", "I", "--rank", "2"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_customer_type_list() {
        let cli = parse(&["widget-report", "--customer-types", "I, R,G"]);
        assert_eq!(cli.customer_type_list(), Some(vec!['I', 'R', 'G']));
    }

    #[test]
    fn test_verbosity_count() {
        let cli = parse(&["widget-report", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }
}
