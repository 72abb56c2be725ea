//! Widget purchase records
//!
//! A [`Record`] is one purchase line from the input file. Records are immutable once
//! read; they travel between participants inside protocol messages.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use loader::{load_dataset, parse_dataset};

/// One widget purchase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Model number (category index once validated)
    pub model_number: i64,
    /// Purchase date encoded as YYYYMM
    pub purchase_date: i64,
    /// Single-character customer type
    pub customer_type: char,
    /// Purchase amount
    pub purchase_amount: f64,
}

impl Record {
    pub fn new(model_number: i64, purchase_date: i64, customer_type: char, purchase_amount: f64) -> Self {
        Self {
            model_number,
            purchase_date,
            customer_type,
            purchase_amount,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{modelNumber: {}, date: {}, customerType: {}, amount: {}}}",
            self.model_number, self.purchase_date, self.customer_type, self.purchase_amount
        )
    }
}

/// Complete input: ordered records plus the category count `M`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Records in file order
    pub records: Vec<Record>,
    /// Number of model categories; valid model numbers are `[0, categories)`
    pub categories: usize,
}

impl Dataset {
    pub fn new(records: Vec<Record>, categories: usize) -> Self {
        Self { records, categories }
    }

    /// Number of records (`N`)
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
