//! Input file loading
//!
//! Format: whitespace-separated tokens. The first two are `N` (record count) and
//! `M` (category count), followed by exactly `N` groups of
//! `modelNumber purchaseDate customerType purchaseAmount`.
//!
//! ```text
//! 2 2
//! 0 202001 I 10.0
//! 1 202001 R 5.0
//! ```

use super::{Dataset, Record};
use crate::error::FatalError;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Largest accepted category count
///
/// Every participant allocates three totals per category, so the header bounds
/// the memory of the whole run.
pub const MAX_CATEGORIES: usize = 1 << 20;

/// Load a dataset from a file
///
/// A file that cannot be read is reported as an invalid input path; a file that
/// reads but does not follow the format is reported as malformed input.
pub fn load_dataset(path: &Path) -> Result<Dataset, FatalError> {
    let contents = fs::read_to_string(path).map_err(|source| FatalError::InvalidInputPath {
        path: path.to_path_buf(),
        source,
    })?;

    parse_dataset(path, &contents)
}

/// Parse dataset text (`path` is only used in error messages)
pub fn parse_dataset(path: &Path, contents: &str) -> Result<Dataset, FatalError> {
    let malformed = |reason: String| FatalError::MalformedInput {
        path: path.to_path_buf(),
        reason,
    };

    let mut tokens = contents.split_whitespace();

    let record_count: usize = next_value(&mut tokens, "record count").map_err(malformed)?;
    let categories: usize = next_value(&mut tokens, "category count").map_err(malformed)?;
    if categories > MAX_CATEGORIES {
        return Err(malformed(format!(
            "category count {} exceeds the limit of {}",
            categories, MAX_CATEGORIES
        )));
    }

    let mut records = Vec::with_capacity(record_count.min(1 << 20));
    for index in 0..record_count {
        let record = next_record(&mut tokens)
            .map_err(|reason| malformed(format!("record {}: {}", index, reason)))?;
        records.push(record);
    }

    if tokens.next().is_some() {
        tracing::warn!(
            path = %path.display(),
            record_count,
            "Input has trailing tokens after the declared record count; ignoring them"
        );
    }

    Ok(Dataset::new(records, categories))
}

fn next_record<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<Record, String> {
    let model_number: i64 = next_value(tokens, "model number")?;
    let purchase_date: i64 = next_value(tokens, "purchase date")?;
    let customer_type = next_char(tokens)?;
    let purchase_amount: f64 = next_value(tokens, "purchase amount")?;

    Ok(Record::new(model_number, purchase_date, customer_type, purchase_amount))
}

fn next_value<'a, T: FromStr>(tokens: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<T, String> {
    let token = tokens
        .next()
        .ok_or_else(|| format!("unexpected end of input, expected {}", what))?;

    token
        .parse()
        .map_err(|_| format!("invalid {} '{}'", what, token))
}

fn next_char<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<char, String> {
    let token = tokens
        .next()
        .ok_or_else(|| "unexpected end of input, expected customer type".to_string())?;

    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("customer type must be a single character, got '{}'", token)),
    }
}
