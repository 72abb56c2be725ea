//! Run-level (fatal) errors
//!
//! These conditions are detected by the coordinator before any distributed work
//! starts and terminate the whole run. Record-level problems are not errors in this
//! sense; see [`crate::validate::ErrorCode`].

use std::path::PathBuf;
use thiserror::Error;

/// Exit status for command lines that cannot be parsed at all
///
/// Distinct from every [`FatalError::exit_code`].
pub const USAGE_EXIT_CODE: i32 = 64;

/// Fatal condition that aborts the entire run
#[derive(Debug, Error)]
pub enum FatalError {
    /// Input file could not be opened
    #[error("An invalid file path was given for reading: {}", path.display())]
    InvalidInputPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input file opened but could not be parsed
    #[error("Malformed input file {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    /// Target customer type is not a single accepted character
    #[error("An invalid customer type was given for reading: '{customer_type}' (accepted: {accepted})")]
    InvalidCustomerType { customer_type: String, accepted: String },

    /// Target report year is not a year in the accepted range
    #[error("An invalid report year was given for reading: {year} (accepted: {min}-{max})")]
    InvalidReportYear { year: String, min: i32, max: i32 },

    /// Configuration cannot describe a runnable cluster
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    /// Coordinator sent the abort sentinel
    #[error("Run aborted by coordinator: {0}")]
    Aborted(String),
}

impl FatalError {
    /// Process exit status for this condition
    ///
    /// Each fatal condition maps to its own non-zero status so scripts can tell
    /// them apart. Status 1 is left for unexpected failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::InvalidInputPath { .. } => 2,
            FatalError::MalformedInput { .. } => 3,
            FatalError::InvalidCustomerType { .. } => 4,
            FatalError::InvalidReportYear { .. } => 5,
            FatalError::InvalidConfig(_) => 6,
            FatalError::Aborted(_) => 7,
        }
    }

    /// Find a fatal error anywhere in an anyhow error chain
    pub fn find_in(err: &anyhow::Error) -> Option<&FatalError> {
        err.chain().find_map(|cause| cause.downcast_ref::<FatalError>())
    }
}
