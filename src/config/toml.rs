//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use crate::config::validator::{parse_customer_type, parse_report_year};
use crate::error::FatalError;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
///
/// Report targets are parsed here, after the validation domains are merged, so
/// an unparsable year or customer type fails with the same status as an
/// unaccepted one.
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config, FatalError> {
    if let Some(ref path) = cli.path {
        config.input.path = Some(path.clone());
    }

    // Validation domains
    if let Some(min_year) = cli.min_year {
        config.rules.min_year = min_year;
    }
    if let Some(max_year) = cli.max_year {
        config.rules.max_year = max_year;
    }
    if let Some(types) = cli.customer_type_list() {
        config.rules.customer_types = types;
    }

    // Report targets
    if let Some(ref year) = cli.report_year {
        config.report.year = Some(parse_report_year(year, &config.rules)?);
    }
    if let Some(ref customer_type) = cli.customer_type {
        config.report.customer_type = Some(parse_customer_type(customer_type, &config.rules)?);
    }

    // Cluster settings
    if let Some(world_size) = cli.world_size {
        config.cluster.world_size = world_size;
    }
    if let Some(ref host) = cli.bind_host {
        config.cluster.bind_host = host.clone();
    }
    if let Some(timeout) = cli.connect_timeout {
        config.cluster.connect_timeout_secs = timeout;
    }

    // Output settings
    if let Some(ref json) = cli.json_output {
        config.output.json_output = Some(json.clone());
    }
    if let Some(ref csv) = cli.csv_output {
        config.output.csv_output = Some(csv.clone());
    }
    if cli.quiet {
        config.output.quiet = true;
    }

    Ok(config)
}

/// Build the effective configuration: optional TOML file, then CLI overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    Ok(merge_cli_with_config(cli, base)?)
}
