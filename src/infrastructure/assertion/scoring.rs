//! Custom scoring functions overriding the default assertion aggregation

use serde_json::{json, Map, Value};

use super::checks::verdict;
use crate::domain::expression::ExpressionEvaluator;
use crate::domain::test_case::GradingResult;
use crate::domain::vars::Vars;
use crate::domain::DomainError;

/// Re-score `grading` with a user expression
///
/// The expression sees `namedScores` and `context` (`vars`, `componentResults`)
/// and must return a `{pass, score, reason}` object. Any other result, or an
/// evaluation error, fails the whole unit.
pub fn apply_scoring_function(
    evaluator: &dyn ExpressionEvaluator,
    source: &str,
    grading: GradingResult,
    vars: &Vars,
) -> Result<GradingResult, DomainError> {
    let mut bindings = Map::new();
    bindings.insert("namedScores".to_string(), json!(grading.named_scores));
    bindings.insert(
        "context".to_string(),
        json!({
            "vars": vars,
            "componentResults": grading.component_results,
        }),
    );

    let value = evaluator
        .evaluate(source, &bindings)
        .map_err(|e| DomainError::validation(format!("Scoring function failed: {}", e)))?;

    let Value::Object(map) = value else {
        return Err(DomainError::validation(format!(
            "Scoring function must return an object with pass and score, got {}",
            value
        )));
    };

    let outcome = verdict(&map);
    Ok(GradingResult {
        pass: outcome.pass,
        score: outcome.score,
        reason: if outcome.reason.is_empty() {
            grading.reason
        } else {
            outcome.reason
        },
        ..grading
    })
}
