//! Widget Report CLI entry point

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use widget_report::config::cli::{Cli, ExecutionMode};
use widget_report::config::toml::load_config;
use widget_report::config::{validator, Config};
use widget_report::distributed::{self, Coordinator, ParticipantOutcome};
use widget_report::output::{csv, json, text, Report};
use widget_report::error::USAGE_EXIT_CODE;
use widget_report::FatalError;

fn main() {
    let cli = match Cli::parse_args() {
        Ok(cli) => cli,
        Err(e) => exit_usage(e),
    };
    let mode = cli.mode;
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        let fatal = FatalError::find_in(&e);
        if is_abort_echo(mode, fatal) {
            tracing::debug!(error = %format!("{:#}", e), "Stopped by coordinator abort");
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(fatal.map(FatalError::exit_code).unwrap_or(1));
    }
}

/// Print a clap error and exit
///
/// Help and version output keep clap's own status; unparsable command lines exit
/// with [`USAGE_EXIT_CODE`] so they never share a status with a [`FatalError`].
fn exit_usage(e: clap::Error) -> ! {
    if !e.use_stderr() {
        e.exit();
    }
    e.print().ok();
    std::process::exit(USAGE_EXIT_CODE);
}

/// Whether an error is a participant relaying the coordinator's abort
///
/// The coordinator already printed the reason, so participants stay quiet.
fn is_abort_echo(mode: ExecutionMode, fatal: Option<&FatalError>) -> bool {
    mode == ExecutionMode::Participant && matches!(fatal, Some(FatalError::Aborted(_)))
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over `-v`. Logs go to stderr so stdout carries only the report.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    cli.validate()?;

    let config = load_config(&cli)?;
    validator::validate_config(&config)?;
    tracing::debug!("{}", config);

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    match cli.mode {
        ExecutionMode::Launch => run_launch(&runtime, config, cli.verbose),
        ExecutionMode::Participant => run_participant(&runtime, config, &cli),
        ExecutionMode::InProcess => {
            let outcome = runtime.block_on(distributed::run_in_process(config.clone()))?;
            write_report(&outcome.report, &config)
        }
    }
}

/// Spawn one child per non-coordinator rank and run the coordinator here
fn run_launch(runtime: &tokio::runtime::Runtime, config: Config, verbose: u8) -> Result<()> {
    let config = Arc::new(config);
    let host = config.cluster.bind_host.clone();

    let listener = runtime
        .block_on(tokio::net::TcpListener::bind((host.as_str(), 0)))
        .with_context(|| format!("Failed to bind coordinator listener on {}", host))?;
    let coordinator_addr = listener.local_addr()?;
    let sink_addr = SocketAddr::new(coordinator_addr.ip(), find_available_port(&host)?);

    tracing::info!(
        world_size = config.cluster.world_size,
        %coordinator_addr,
        %sink_addr,
        "Launching participants"
    );

    let mut children = Vec::new();
    for rank in 1..config.cluster.world_size {
        match launch_participant(rank, &config, coordinator_addr, sink_addr, verbose) {
            Ok(child) => children.push((rank, child)),
            Err(e) => {
                cleanup_participants(children, Duration::ZERO);
                return Err(e);
            }
        }
    }

    let coordinator = Coordinator::new(config.clone(), listener, sink_addr);
    let result = runtime.block_on(coordinator.run());

    // Participants exit on their own once the run is over or aborted
    cleanup_participants(children, config.cluster.connect_timeout());

    let report = result?;
    write_report(&report, &config)
}

/// Run the role selected by `--rank`
fn run_participant(runtime: &tokio::runtime::Runtime, config: Config, cli: &Cli) -> Result<()> {
    // Presence is checked by Cli::validate
    let rank = cli.rank.context("--rank is required in participant mode")?;
    let sink_addr = cli.sink_addr.context("--sink-addr is required in participant mode")?;

    let config = Arc::new(config);
    let outcome = runtime.block_on(distributed::run_participant(
        rank,
        config.clone(),
        cli.coordinator_addr,
        sink_addr,
    ))?;

    match outcome {
        ParticipantOutcome::Coordinator(report) => write_report(&report, &config),
        ParticipantOutcome::Sink(summary) => {
            if let Some(reason) = summary.aborted {
                return Err(FatalError::Aborted(reason).into());
            }
            Ok(())
        }
        ParticipantOutcome::Worker(_) => Ok(()),
    }
}

/// Print the table and write the requested exports
fn write_report(report: &Report, config: &Config) -> Result<()> {
    if !config.output.quiet {
        text::print_report(report);
    }

    if let Some(ref path) = config.output.json_output {
        json::write_json_output(path, report, config.cluster.world_size, true)?;
        tracing::info!(path = %path.display(), "JSON report written");
    }

    if let Some(ref path) = config.output.csv_output {
        csv::write_csv_output(path, report)?;
        tracing::info!(path = %path.display(), "CSV report written");
    }

    Ok(())
}

/// Find a free port for the error sink
fn find_available_port(host: &str) -> Result<u16> {
    let listener = std::net::TcpListener::bind((host, 0))
        .with_context(|| format!("No available port on {} for the error sink", host))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Start this executable in participant mode for one rank
fn launch_participant(
    rank: usize,
    config: &Config,
    coordinator_addr: SocketAddr,
    sink_addr: SocketAddr,
    verbose: u8,
) -> Result<Child> {
    let exe_path = std::env::current_exe()
        .context("Failed to get current executable path")?;

    let mut cmd = Command::new(&exe_path);
    cmd.arg("--mode").arg("participant");
    cmd.arg("--rank").arg(rank.to_string());
    cmd.arg("--world-size").arg(config.cluster.world_size.to_string());
    cmd.arg("--coordinator-addr").arg(coordinator_addr.to_string());
    cmd.arg("--sink-addr").arg(sink_addr.to_string());
    cmd.arg("--connect-timeout").arg(config.cluster.connect_timeout_secs.to_string());
    cmd.arg("--min-year").arg(config.rules.min_year.to_string());
    cmd.arg("--max-year").arg(config.rules.max_year.to_string());
    cmd.arg("--customer-types").arg(config.rules.customer_types_string());
    if verbose > 0 {
        cmd.arg(format!("-{}", "v".repeat(verbose as usize)));
    }

    // The report is printed by the coordinator only; logs stay on stderr
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::inherit());

    let child = cmd.spawn()
        .with_context(|| format!("Failed to spawn participant for rank {}", rank))?;
    tracing::debug!(rank, pid = child.id(), "Participant launched");

    Ok(child)
}

/// Wait for every participant to exit, killing any that outlive `grace`
fn cleanup_participants(children: Vec<(usize, Child)>, grace: Duration) {
    let deadline = std::time::Instant::now() + grace;

    for (rank, mut child) in children {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        tracing::debug!(rank, %status, "Participant exited with failure");
                    }
                    break;
                }
                Ok(None) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Ok(None) => {
                    tracing::warn!(rank, "Participant still running, killing it");
                    child.kill().ok();
                    child.wait().ok();
                    break;
                }
                Err(e) => {
                    tracing::warn!(rank, error = %e, "Failed to wait for participant");
                    break;
                }
            }
        }
    }
}
