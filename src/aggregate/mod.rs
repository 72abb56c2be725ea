//! Per-category aggregation
//!
//! Each participant owns one [`Aggregator`]. Valid records are ingested into three
//! parallel per-category running totals; the resulting [`AggregationState`] is
//! handed to the reduction exactly once via [`Aggregator::snapshot`].
//!
//! # Example
//!
//! ```
//! use widget_report::aggregate::{Aggregator, ReportTargets};
//! use widget_report::Record;
//!
//! let targets = ReportTargets { year: 2010, customer_type: 'I' };
//! let mut aggregator = Aggregator::new(2, targets);
//! aggregator.ingest(&Record::new(1, 201003, 'R', 4.0), 2010);
//!
//! let state = aggregator.snapshot();
//! assert_eq!(state.total_all, vec![0.0, 4.0]);
//! assert_eq!(state.total_for_year, vec![0.0, 4.0]);
//! assert_eq!(state.total_for_type, vec![0.0, 0.0]);
//! ```

use crate::record::Record;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Report year and customer type the filtered totals select on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTargets {
    pub year: i32,
    pub customer_type: char,
}

/// Three per-category running totals
///
/// All three vectors are sized to the category count `M`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationState {
    /// Sum of all valid purchase amounts per category
    pub total_all: Vec<f64>,
    /// Sum restricted to the report year
    pub total_for_year: Vec<f64>,
    /// Sum restricted to the report customer type
    pub total_for_type: Vec<f64>,
}

impl AggregationState {
    /// Zeroed totals for `categories` categories
    pub fn zeroed(categories: usize) -> Self {
        Self {
            total_all: vec![0.0; categories],
            total_for_year: vec![0.0; categories],
            total_for_type: vec![0.0; categories],
        }
    }

    /// Number of categories
    pub fn categories(&self) -> usize {
        self.total_all.len()
    }

    /// Element-wise add another participant's totals
    ///
    /// Both states must cover the same categories.
    pub fn merge(&mut self, other: &AggregationState) -> Result<()> {
        if other.categories() != self.categories()
            || other.total_for_year.len() != self.categories()
            || other.total_for_type.len() != self.categories()
        {
            anyhow::bail!(
                "Cannot merge totals for {} categories into totals for {} categories",
                other.categories(),
                self.categories()
            );
        }

        add_into(&mut self.total_all, &other.total_all);
        add_into(&mut self.total_for_year, &other.total_for_year);
        add_into(&mut self.total_for_type, &other.total_for_type);

        Ok(())
    }
}

fn add_into(dst: &mut [f64], src: &[f64]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

/// Local aggregation state for one participant
#[derive(Debug)]
pub struct Aggregator {
    state: AggregationState,
    targets: ReportTargets,
    ingested: usize,
}

impl Aggregator {
    pub fn new(categories: usize, targets: ReportTargets) -> Self {
        Self {
            state: AggregationState::zeroed(categories),
            targets,
            ingested: 0,
        }
    }

    /// Add a validated record
    ///
    /// `year` is the purchase year decoded by the validator. The record's model
    /// number must already be known to lie in `[0, M)`.
    pub fn ingest(&mut self, record: &Record, year: i32) {
        let category = record.model_number as usize;
        debug_assert!(category < self.state.categories());

        let amount = record.purchase_amount;
        self.state.total_all[category] += amount;

        if year == self.targets.year {
            self.state.total_for_year[category] += amount;
        }
        if record.customer_type == self.targets.customer_type {
            self.state.total_for_type[category] += amount;
        }

        self.ingested += 1;
    }

    /// Number of records ingested so far
    pub fn ingested(&self) -> usize {
        self.ingested
    }

    /// Consume the aggregator and hand its totals to the reduction
    pub fn snapshot(self) -> AggregationState {
        self.state
    }
}
