//! Human-readable text output

use super::Report;
use std::fmt::Write;

/// Render the report table
///
/// One header line followed by one row per category: category index, total,
/// total for the report year and total for the report customer type, each
/// right-aligned in a fixed-width column.
pub fn render_table(report: &Report) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Model Number\t\tTotal Amounts\t\tAmounts for {}\t\tAmounts for Customer Type {}",
        report.targets.year, report.targets.customer_type
    );

    for row in &report.rows {
        let _ = writeln!(
            out,
            "{:>5}{:>30}{:>25}{:>40}",
            row.category, row.total, row.total_for_year, row.total_for_type
        );
    }

    out
}

/// Print the report to stdout
pub fn print_report(report: &Report) {
    print!("{}", render_table(report));
}
