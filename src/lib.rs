//! Widget Report - distributed per-model sales aggregation
//!
//! Widget Report reads a file of widget purchase records, splits it across a fixed
//! set of cooperating processes, validates and aggregates each block locally and
//! reduces the partial sums into a single per-model report.
//!
//! # Architecture
//!
//! - **Coordinator** (rank 0): loads input, partitions, scatters, reduces, renders
//! - **Error sink** (rank 1): collects rejected records from every participant
//! - **Workers** (rank 2+): validate and aggregate their block, join the reduction
//!
//! The pure building blocks (`validate`, `partition`, `aggregate`) have no
//! transport dependency and are tested on their own.

pub mod aggregate;
pub mod config;
pub mod distributed;
pub mod error;
pub mod output;
pub mod partition;
pub mod record;
pub mod validate;

// Re-export commonly used types
pub use config::Config;
pub use error::FatalError;
pub use record::{Dataset, Record};

/// Result type used throughout Widget Report
pub type Result<T> = anyhow::Result<T>;
