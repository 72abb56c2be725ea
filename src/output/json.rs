//! JSON output formatting
//!
//! The exported document carries the report targets, one object per category and
//! a small run summary, stamped with the generation time.

use super::{Report, ReportRow};
use crate::aggregate::ReportTargets;
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Top-level JSON document
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a> {
    /// RFC 3339 timestamp
    pub generated_at: String,
    /// Processes in the run (coordinator + error sink + workers)
    pub world_size: usize,
    pub targets: &'a ReportTargets,
    pub categories: usize,
    pub grand_total: f64,
    pub rows: &'a [ReportRow],
}

impl<'a> JsonReport<'a> {
    pub fn new(report: &'a Report, world_size: usize) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            world_size,
            targets: &report.targets,
            categories: report.rows.len(),
            grand_total: report.grand_total(),
            rows: &report.rows,
        }
    }
}

/// Write the report as JSON
pub fn write_json_output(output_path: &Path, report: &Report, world_size: usize, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);
    let doc = JsonReport::new(report, world_size);

    if pretty {
        serde_json::to_writer_pretty(&mut writer, &doc)?;
    } else {
        serde_json::to_writer(&mut writer, &doc)?;
    }

    // Dropping a BufWriter discards write errors
    writer.flush()
        .with_context(|| format!("Failed to write JSON output: {}", output_path.display()))?;

    Ok(())
}
