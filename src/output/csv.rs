//! CSV output formatting
//!
//! One header row, then one row per category.

use super::Report;
use crate::Result;
use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column header
pub const CSV_HEADER: &str = "model_number,total,total_for_year,total_for_type,report_year,report_customer_type";

/// Write the report rows in CSV form
pub fn write_csv<W: Write>(out: &mut W, report: &Report) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;

    for row in &report.rows {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            row.category,
            row.total,
            row.total_for_year,
            row.total_for_type,
            report.targets.year,
            report.targets.customer_type
        )?;
    }

    Ok(())
}

/// Write the report to a CSV file
pub fn write_csv_output(output_path: &Path, report: &Report) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create CSV output: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write_csv(&mut writer, report)?;
    writer.flush()?;

    Ok(())
}
