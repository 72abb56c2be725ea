//! Configuration validation
//!
//! Everything here is a run-level check: a failure is a [`FatalError`] and the run
//! does not start (or is aborted by the coordinator).

use super::*;
use crate::aggregate::ReportTargets;
use crate::error::FatalError;

/// Validate the settings every role depends on
pub fn validate_config(config: &Config) -> Result<(), FatalError> {
    validate_rules(&config.rules)?;
    validate_cluster(&config.cluster)?;
    Ok(())
}

/// Validate the accepted record domains
pub fn validate_rules(rules: &RulesConfig) -> Result<(), FatalError> {
    if rules.min_year > rules.max_year {
        return Err(FatalError::InvalidConfig(format!(
            "min_year ({}) must not exceed max_year ({})",
            rules.min_year, rules.max_year
        )));
    }

    if rules.customer_types.is_empty() {
        return Err(FatalError::InvalidConfig(
            "at least one accepted customer type is required".to_string(),
        ));
    }

    Ok(())
}

/// Validate participant layout
pub fn validate_cluster(cluster: &ClusterConfig) -> Result<(), FatalError> {
    // Rank 0 is the coordinator and rank 1 the error sink
    if cluster.world_size < 2 {
        return Err(FatalError::InvalidConfig(format!(
            "world_size must be at least 2 (coordinator + error sink), got {}",
            cluster.world_size
        )));
    }

    if cluster.connect_timeout_secs == 0 {
        return Err(FatalError::InvalidConfig(
            "connect_timeout_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Resolve and check the report targets against the accepted domains
///
/// Customer type is checked before year, matching the order in which the
/// coordinator reports run-level problems.
pub fn validate_report(report: &ReportConfig, rules: &RulesConfig) -> Result<ReportTargets, FatalError> {
    let customer_type = report
        .customer_type
        .ok_or_else(|| FatalError::InvalidConfig("report customer type is required".to_string()))?;
    let year = report
        .year
        .ok_or_else(|| FatalError::InvalidConfig("report year is required".to_string()))?;

    if !rules.customer_types.contains(&customer_type) {
        return Err(FatalError::InvalidCustomerType {
            customer_type: customer_type.to_string(),
            accepted: rules.customer_types_string(),
        });
    }

    if year < rules.min_year || year > rules.max_year {
        return Err(FatalError::InvalidReportYear {
            year: year.to_string(),
            min: rules.min_year,
            max: rules.max_year,
        });
    }

    Ok(ReportTargets { year, customer_type })
}

/// Parse a report year given on the command line
///
/// A value that is not an integer is reported like an out-of-range year.
pub fn parse_report_year(raw: &str, rules: &RulesConfig) -> Result<i32, FatalError> {
    raw.trim().parse().map_err(|_| FatalError::InvalidReportYear {
        year: raw.to_string(),
        min: rules.min_year,
        max: rules.max_year,
    })
}

/// Parse a customer type given on the command line
///
/// Anything but exactly one character is reported like an unaccepted type.
pub fn parse_customer_type(raw: &str, rules: &RulesConfig) -> Result<char, FatalError> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(FatalError::InvalidCustomerType {
            customer_type: raw.to_string(),
            accepted: rules.customer_types_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(year: i32, customer_type: char) -> ReportConfig {
        ReportConfig {
            year: Some(year),
            customer_type: Some(customer_type),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_world_size_too_small() {
        let mut config = Config::default();
        config.cluster.world_size = 1;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, FatalError::InvalidConfig(_)));
    }

    #[test]
    fn test_inverted_year_range() {
        let mut config = Config::default();
        config.rules.min_year = 2020;
        config.rules.max_year = 2000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_customer_types() {
        let mut config = Config::default();
        config.rules.customer_types.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_valid_report() {
        let targets = validate_report(&report(2005, 'R'), &RulesConfig::default()).unwrap();
        assert_eq!(targets, ReportTargets { year: 2005, customer_type: 'R' });
    }

    #[test]
    fn test_invalid_customer_type() {
        let err = validate_report(&report(2005, 'X'), &RulesConfig::default()).unwrap_err();
        assert!(matches!(err, FatalError::InvalidCustomerType { ref customer_type, .. } if customer_type == "X"));
    }

    #[test]
    fn test_invalid_report_year() {
        let err = validate_report(&report(2019, 'I'), &RulesConfig::default()).unwrap_err();
        assert!(matches!(err, FatalError::InvalidReportYear { ref year, .. } if year == "2019"));

        let err = validate_report(&report(1996, 'I'), &RulesConfig::default()).unwrap_err();
        assert!(matches!(err, FatalError::InvalidReportYear { ref year, .. } if year == "1996"));
    }

    #[test]
    fn test_customer_type_checked_first() {
        let err = validate_report(&report(1900, 'X'), &RulesConfig::default()).unwrap_err();
        assert!(matches!(err, FatalError::InvalidCustomerType { .. }));
    }

    #[test]
    fn test_parse_report_year() {
        let rules = RulesConfig::default();
        assert_eq!(parse_report_year("2010", &rules).unwrap(), 2010);

        let err = parse_report_year("20x0", &rules).unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("20x0"));
    }

    #[test]
    fn test_parse_customer_type() {
        let rules = RulesConfig::default();
        assert_eq!(parse_customer_type("G", &rules).unwrap(), 'G');

        for raw in ["IR", ""] {
            let err = parse_customer_type(raw, &rules).unwrap_err();
            assert_eq!(err.exit_code(), 4);
        }
    }

    #[test]
    fn test_missing_targets() {
        let err = validate_report(&ReportConfig::default(), &RulesConfig::default()).unwrap_err();
        assert!(matches!(err, FatalError::InvalidConfig(_)));
    }

    #[test]
    fn test_configured_year_range() {
        let rules = RulesConfig {
            min_year: 2000,
            max_year: 2030,
            ..RulesConfig::default()
        };
        assert!(validate_report(&report(2020, 'I'), &rules).is_ok());
    }
}
