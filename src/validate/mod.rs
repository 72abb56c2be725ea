//! Per-record validation
//!
//! [`classify`] is a pure function from a record to either the decoded purchase
//! year or the first failing [`ErrorCode`]. Checks run in a fixed priority order and
//! only the first failure is reported:
//!
//! 1. model number in `[0, M)`
//! 2. purchase date has exactly six digits (YYYYMM)
//! 3. month in `[1, 12]`
//! 4. year in the accepted range
//! 5. customer type in the accepted set
//! 6. purchase amount positive

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record-level validation failure
///
/// The numeric value is the tag used on the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    BadModelNumber = 1,
    BadPurchaseDate = 2,
    BadPurchaseMonth = 3,
    BadPurchaseYear = 4,
    BadCustomerType = 5,
    BadPurchaseAmount = 6,
}

impl ErrorCode {
    /// All codes in priority order
    pub const ALL: [ErrorCode; 6] = [
        ErrorCode::BadModelNumber,
        ErrorCode::BadPurchaseDate,
        ErrorCode::BadPurchaseMonth,
        ErrorCode::BadPurchaseYear,
        ErrorCode::BadCustomerType,
        ErrorCode::BadPurchaseAmount,
    ];

    /// Wire tag (1-6)
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a code from its wire tag
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Human-readable reason
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::BadModelNumber => "Bad model number",
            ErrorCode::BadPurchaseDate => "Bad purchase date",
            ErrorCode::BadPurchaseMonth => "Bad purchase month",
            ErrorCode::BadPurchaseYear => "Bad purchase year",
            ErrorCode::BadCustomerType => "Bad customer type",
            ErrorCode::BadPurchaseAmount => "Bad purchase amount",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of validating one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    /// Record is valid; carries the decoded purchase year
    Valid(i32),
    /// Record is rejected with the first failing check
    Invalid(ErrorCode),
}

/// Domain of accepted record values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Number of model categories (`M`)
    pub categories: usize,
    /// Earliest accepted purchase year (inclusive)
    pub min_year: i32,
    /// Latest accepted purchase year (inclusive)
    pub max_year: i32,
    /// Accepted customer types
    pub customer_types: Vec<char>,
}

impl ValidationRules {
    pub fn accepts_year(&self, year: i32) -> bool {
        (self.min_year..=self.max_year).contains(&year)
    }

    pub fn accepts_customer_type(&self, customer_type: char) -> bool {
        self.customer_types.contains(&customer_type)
    }
}

/// Validate a record against the rules
pub fn classify(record: &Record, rules: &ValidationRules) -> ValidationResult {
    use ValidationResult::Invalid;

    if record.model_number < 0 || record.model_number as u64 >= rules.categories as u64 {
        return Invalid(ErrorCode::BadModelNumber);
    }

    let (year, month) = match decode_date(record.purchase_date) {
        Some(parts) => parts,
        None => return Invalid(ErrorCode::BadPurchaseDate),
    };

    if !(1..=12).contains(&month) {
        return Invalid(ErrorCode::BadPurchaseMonth);
    }
    if !rules.accepts_year(year) {
        return Invalid(ErrorCode::BadPurchaseYear);
    }
    if !rules.accepts_customer_type(record.customer_type) {
        return Invalid(ErrorCode::BadCustomerType);
    }
    // Also rejects NaN
    if !(record.purchase_amount > 0.0) {
        return Invalid(ErrorCode::BadPurchaseAmount);
    }

    ValidationResult::Valid(year)
}

/// Split a YYYYMM date into (year, month)
///
/// Returns `None` unless the value has exactly six decimal digits.
fn decode_date(date: i64) -> Option<(i32, i32)> {
    if !(100_000..=999_999).contains(&date) {
        return None;
    }
    Some(((date / 100) as i32, (date % 100) as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ValidationRules {
        ValidationRules {
            categories: 2,
            min_year: 1997,
            max_year: 2018,
            customer_types: vec!['I', 'R', 'G'],
        }
    }

    fn check(model: i64, date: i64, customer_type: char, amount: f64) -> ValidationResult {
        classify(&Record::new(model, date, customer_type, amount), &rules())
    }

    #[test]
    fn test_valid_record() {
        assert_eq!(check(0, 201001, 'I', 10.0), ValidationResult::Valid(2010));
        assert_eq!(check(1, 199712, 'G', 0.01), ValidationResult::Valid(1997));
        assert_eq!(check(1, 201801, 'R', 1.0), ValidationResult::Valid(2018));
    }

    #[test]
    fn test_bad_model_number() {
        assert_eq!(check(-1, 201001, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadModelNumber));
        assert_eq!(check(2, 201001, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadModelNumber));
        assert_eq!(check(3, 202001, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadModelNumber));
    }

    #[test]
    fn test_bad_purchase_date() {
        assert_eq!(check(0, 20101, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseDate));
        assert_eq!(check(0, 2010011, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseDate));
        assert_eq!(check(0, -20101, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseDate));
    }

    #[test]
    fn test_bad_purchase_month() {
        assert_eq!(check(0, 201013, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseMonth));
        assert_eq!(check(0, 201000, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseMonth));
    }

    #[test]
    fn test_bad_purchase_year() {
        assert_eq!(check(0, 196001, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseYear));
        assert_eq!(check(0, 201901, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseYear));
    }

    #[test]
    fn test_bad_customer_type() {
        assert_eq!(check(0, 201001, 'X', 10.0), ValidationResult::Invalid(ErrorCode::BadCustomerType));
        assert_eq!(check(0, 201001, 'i', 10.0), ValidationResult::Invalid(ErrorCode::BadCustomerType));
    }

    #[test]
    fn test_bad_purchase_amount() {
        assert_eq!(check(0, 201001, 'I', 0.0), ValidationResult::Invalid(ErrorCode::BadPurchaseAmount));
        assert_eq!(check(0, 201001, 'I', -3.0), ValidationResult::Invalid(ErrorCode::BadPurchaseAmount));
        assert_eq!(check(0, 201001, 'I', f64::NAN), ValidationResult::Invalid(ErrorCode::BadPurchaseAmount));
    }

    #[test]
    fn test_first_failure_wins() {
        // Fails every check; model number has priority
        assert_eq!(check(9, 12, 'X', -1.0), ValidationResult::Invalid(ErrorCode::BadModelNumber));
        // Bad month and bad year: month reported
        assert_eq!(check(0, 196013, 'I', 10.0), ValidationResult::Invalid(ErrorCode::BadPurchaseMonth));
        // Bad type and bad amount: type reported
        assert_eq!(check(0, 201001, 'Q', 0.0), ValidationResult::Invalid(ErrorCode::BadCustomerType));
    }

    #[test]
    fn test_configurable_domains() {
        let rules = ValidationRules {
            categories: 10,
            min_year: 1950,
            max_year: 2030,
            customer_types: vec!['Z'],
        };
        let record = Record::new(9, 196001, 'Z', 1.0);
        assert_eq!(classify(&record, &rules), ValidationResult::Valid(1960));
    }

    #[test]
    fn test_error_code_tags() {
        for (i, code) in ErrorCode::ALL.iter().enumerate() {
            assert_eq!(code.code() as usize, i + 1);
            assert_eq!(ErrorCode::from_code(code.code()), Some(*code));
        }
        assert_eq!(ErrorCode::from_code(0), None);
        assert_eq!(ErrorCode::from_code(7), None);
        assert_eq!(ErrorCode::BadPurchaseMonth.to_string(), "Bad purchase month");
    }
}
