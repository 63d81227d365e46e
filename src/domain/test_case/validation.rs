//! Test case validation

use regex::Regex;
use thiserror::Error;

use super::{Assertion, AssertionKind, TestCase};
use crate::domain::DomainError;

/// Validation errors for test cases
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TestCaseValidationError {
    #[error("Unknown assertion type: {0}")]
    UnknownAssertionType(String),

    #[error("Assertion '{0}' requires a value")]
    MissingValue(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("Assertion weight must not be negative: {0}")]
    NegativeWeight(f64),

    #[error("Assertion '{0}' requires a threshold")]
    MissingThreshold(String),
}

impl From<TestCaseValidationError> for DomainError {
    fn from(err: TestCaseValidationError) -> Self {
        DomainError::configuration(err.to_string())
    }
}

/// Validate every assertion of a test case
pub fn validate_test_case(test_case: &TestCase) -> Result<(), TestCaseValidationError> {
    for assertion in &test_case.assert {
        validate_assertion(assertion)?;
    }
    Ok(())
}

/// Validate a single assertion
pub fn validate_assertion(assertion: &Assertion) -> Result<(), TestCaseValidationError> {
    let (_, kind) = assertion.kind()?;

    if kind.requires_value() && assertion.value.is_none() {
        return Err(TestCaseValidationError::MissingValue(
            assertion.assertion_type.clone(),
        ));
    }

    if let Some(weight) = assertion.weight {
        if weight < 0.0 {
            return Err(TestCaseValidationError::NegativeWeight(weight));
        }
    }

    match kind {
        AssertionKind::Regex => {
            let pattern = assertion
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Regex::new(pattern)
                .map_err(|e| TestCaseValidationError::InvalidRegex(e.to_string()))?;
        }
        AssertionKind::Latency if assertion.threshold.is_none() => {
            return Err(TestCaseValidationError::MissingThreshold(
                assertion.assertion_type.clone(),
            ));
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_assertions() {
        assert!(validate_assertion(&Assertion::contains("x")).is_ok());
        assert!(validate_assertion(&Assertion::new("is-json")).is_ok());
        assert!(validate_assertion(&Assertion::new("latency").with_threshold(100.0)).is_ok());
    }

    #[test]
    fn test_missing_value() {
        let err = validate_assertion(&Assertion::new("contains")).unwrap_err();
        assert_eq!(err, TestCaseValidationError::MissingValue("contains".to_string()));
    }

    #[test]
    fn test_invalid_regex() {
        let err = validate_assertion(&Assertion::new("regex").with_value("(unclosed")).unwrap_err();
        assert!(matches!(err, TestCaseValidationError::InvalidRegex(_)));
    }

    #[test]
    fn test_latency_requires_threshold() {
        let err = validate_assertion(&Assertion::new("latency")).unwrap_err();
        assert!(matches!(err, TestCaseValidationError::MissingThreshold(_)));
    }

    #[test]
    fn test_validate_test_case_reports_first_error() {
        let test = TestCase::new()
            .with_assertion(Assertion::contains("ok"))
            .with_assertion(Assertion::new("vibes").with_value("good"));
        let err = validate_test_case(&test).unwrap_err();
        assert_eq!(err, TestCaseValidationError::UnknownAssertionType("vibes".to_string()));
    }
}
