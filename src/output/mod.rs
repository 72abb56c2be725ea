//! Report output
//!
//! The coordinator turns the reduced totals into a [`Report`] and renders it as a
//! text table on stdout ([`text`]), and optionally exports it as JSON ([`json`]) or
//! CSV ([`csv`]).

pub mod csv;
pub mod json;
pub mod text;

use crate::aggregate::{AggregationState, ReportTargets};
use serde::Serialize;

/// One category's reduced totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    /// Category index (model number)
    pub category: usize,
    pub total: f64,
    pub total_for_year: f64,
    pub total_for_type: f64,
}

/// Final per-category report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub targets: ReportTargets,
    /// One row per category, in category order
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Build the report from the reduced totals
    pub fn from_totals(targets: ReportTargets, totals: &AggregationState) -> Self {
        let rows = (0..totals.categories())
            .map(|category| ReportRow {
                category,
                total: totals.total_all[category],
                total_for_year: totals.total_for_year[category],
                total_for_type: totals.total_for_type[category],
            })
            .collect();

        Self { targets, rows }
    }

    /// Sum of all valid purchase amounts
    pub fn grand_total(&self) -> f64 {
        self.rows.iter().map(|r| r.total).sum()
    }

    /// Row for one category
    pub fn row(&self, category: usize) -> Option<&ReportRow> {
        self.rows.get(category)
    }
}
