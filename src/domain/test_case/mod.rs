//! Test case domain - tests, scenarios, assertions and evaluation results

mod assertion;
mod entity;
mod result;
mod validation;

pub use assertion::{Assertion, AssertionKind};
pub use entity::{Scenario, TestCase, TestOptions};
pub use result::{EvaluateResult, GradingResult, NamedScores, ResultFailureReason};
pub use validation::{validate_assertion, validate_test_case, TestCaseValidationError};
