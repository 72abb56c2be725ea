//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::validate::ValidationRules;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Input file location (coordinator only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to the record file
    pub path: Option<PathBuf>,
}

/// Report targets (coordinator only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Year selected by the per-year column
    pub year: Option<i32>,
    /// Customer type selected by the per-type column
    pub customer_type: Option<char>,
}

/// Accepted record domains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Earliest accepted purchase year (inclusive)
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    /// Latest accepted purchase year (inclusive)
    #[serde(default = "default_max_year")]
    pub max_year: i32,
    /// Accepted customer types
    #[serde(default = "default_customer_types")]
    pub customer_types: Vec<char>,
}

fn default_min_year() -> i32 {
    1997
}

fn default_max_year() -> i32 {
    2018
}

fn default_customer_types() -> Vec<char> {
    vec!['I', 'R', 'G']
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            min_year: default_min_year(),
            max_year: default_max_year(),
            customer_types: default_customer_types(),
        }
    }
}

impl RulesConfig {
    /// Validation rules for a dataset with `categories` categories
    pub fn to_validation_rules(&self, categories: usize) -> ValidationRules {
        ValidationRules {
            categories,
            min_year: self.min_year,
            max_year: self.max_year,
            customer_types: self.customer_types.clone(),
        }
    }

    /// Accepted customer types as a compact string ("IRG")
    pub fn customer_types_string(&self) -> String {
        self.customer_types.iter().collect()
    }
}

/// Participant layout and rendezvous settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Total number of processes: coordinator + error sink + workers
    #[serde(default = "default_world_size")]
    pub world_size: usize,
    /// Host the launcher binds its listeners on
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// How long participants keep retrying to reach the coordinator / sink
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_world_size() -> usize {
    4
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            world_size: default_world_size(),
            bind_host: default_bind_host(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ClusterConfig {
    /// Number of participants in the collective group (everyone but the sink)
    pub fn group_size(&self) -> usize {
        self.world_size.saturating_sub(1)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Report export settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write the report as JSON to this path
    pub json_output: Option<PathBuf>,
    /// Write the report as CSV to this path
    pub csv_output: Option<PathBuf>,
    /// Suppress the stdout table
    #[serde(default)]
    pub quiet: bool,
}

// Display trait implementations

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        match &self.input.path {
            Some(path) => writeln!(f, "  Input: {}", path.display())?,
            None => writeln!(f, "  Input: (none)")?,
        }
        writeln!(f, "  Report: {}", self.report)?;
        writeln!(f, "  Rules: {}", self.rules)?;
        writeln!(f, "  Cluster: {}", self.cluster)?;
        Ok(())
    }
}

impl fmt::Display for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "year={}", year)?,
            None => write!(f, "year=(unset)")?,
        }
        match self.customer_type {
            Some(c) => write!(f, ", customer_type={}", c),
            None => write!(f, ", customer_type=(unset)"),
        }
    }
}

impl fmt::Display for RulesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "years {}-{}, customer types [{}]",
            self.min_year,
            self.max_year,
            self.customer_types_string()
        )
    }
}

impl fmt::Display for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processes ({} participants + error sink), bind={}, connect_timeout={}s",
            self.world_size,
            self.group_size(),
            self.bind_host,
            self.connect_timeout_secs
        )
    }
}
