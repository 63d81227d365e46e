//! Runs a test's assertions against an output and combines the results

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::checks::{self, CheckOutcome};
use super::grading::{grade_rubric, GradingProviders};
use crate::domain::expression::{is_truthy, ExpressionEvaluator};
use crate::domain::provider::{ProviderInfo, TokenCounts};
use crate::domain::test_case::{
    Assertion, AssertionKind, GradingResult, NamedScores, TestCase,
};
use crate::domain::vars::{value_to_string, Vars};
use crate::infrastructure::expression::ScriptEvaluator;

/// What assertions may inspect besides the output
#[derive(Debug, Clone, Copy)]
pub struct AssertionContext<'a> {
    pub prompt: &'a str,
    pub vars: &'a Vars,
    pub provider: &'a ProviderInfo,
    pub latency_ms: u64,
}

impl AssertionContext<'_> {
    /// The `context` binding seen by expressions
    pub fn to_value(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "vars": self.vars,
            "provider": self.provider,
        })
    }
}

/// Evaluates assertions, including expression and model-graded kinds
#[derive(Debug, Clone)]
pub struct AssertionRunner {
    evaluator: Arc<dyn ExpressionEvaluator>,
    graders: GradingProviders,
}

impl Default for AssertionRunner {
    fn default() -> Self {
        Self::new(Arc::new(ScriptEvaluator::new()))
    }
}

impl AssertionRunner {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            evaluator,
            graders: GradingProviders::new(),
        }
    }

    pub fn with_graders(mut self, graders: GradingProviders) -> Self {
        self.graders = graders;
        self
    }

    pub fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.evaluator
    }

    /// Run every assertion of `test` and combine them into one result
    pub async fn run(
        &self,
        test: &TestCase,
        output: &Value,
        context: &AssertionContext<'_>,
    ) -> GradingResult {
        if test.assert.is_empty() {
            return GradingResult::pass("No assertions");
        }

        let grader_id = test.options.provider.as_deref();
        let mut components = Vec::with_capacity(test.assert.len());
        for assertion in &test.assert {
            components.push(self.run_one(assertion, grader_id, output, context).await);
        }

        combine(components, test.threshold)
    }

    async fn run_one(
        &self,
        assertion: &Assertion,
        grader_id: Option<&str>,
        output: &Value,
        context: &AssertionContext<'_>,
    ) -> GradingResult {
        let (negated, kind) = match assertion.kind() {
            Ok(kind) => kind,
            Err(e) => return GradingResult::fail(e.to_string()).with_assertion(assertion.clone()),
        };

        let output = match &assertion.transform {
            Some(transform) => match self.evaluate(transform, output, context) {
                Ok(value) => value,
                Err(reason) => {
                    return GradingResult::fail(format!("Assertion transform failed: {}", reason))
                        .with_assertion(assertion.clone());
                }
            },
            None => output.clone(),
        };

        let value = match (&assertion.value, kind.requires_value()) {
            (Some(value), _) => value.clone(),
            (None, false) => Value::Null,
            (None, true) => {
                return GradingResult::fail(format!("Assertion '{}' requires a value", kind))
                    .with_assertion(assertion.clone());
            }
        };

        let text = value_to_string(&output);
        let mut usage = None;
        let outcome = match kind {
            AssertionKind::Equals => checks::equals(&output, &value),
            AssertionKind::Contains => checks::contains(&text, &value, false),
            AssertionKind::Icontains => checks::contains(&text, &value, true),
            AssertionKind::ContainsAny => checks::contains_any(&text, &value),
            AssertionKind::ContainsAll => checks::contains_all(&text, &value),
            AssertionKind::StartsWith => checks::starts_with(&text, &value),
            AssertionKind::Regex => checks::regex(&text, &value),
            AssertionKind::IsJson => checks::is_json(&output),
            AssertionKind::ContainsJson => checks::contains_json(&output),
            AssertionKind::Levenshtein => checks::levenshtein(&text, &value, assertion.threshold),
            AssertionKind::Latency => checks::latency(context.latency_ms, assertion.threshold),
            AssertionKind::Javascript => {
                self.expression_check(&value_to_string(&value), &output, assertion.threshold, context)
            }
            AssertionKind::LlmRubric => match self.graders.resolve(grader_id) {
                Some(grader) => {
                    let graded =
                        grade_rubric(grader.as_ref(), &text, &value_to_string(&value), context.vars)
                            .await;
                    usage = graded.token_usage;
                    CheckOutcome::scored(graded.pass, graded.score, graded.reason)
                }
                None => CheckOutcome::new(
                    false,
                    match grader_id {
                        Some(id) => format!("Grading provider '{}' is not registered", id),
                        None => "No grading provider is configured".to_string(),
                    },
                ),
            },
        };

        let outcome = if negated {
            CheckOutcome::scored(
                !outcome.pass,
                1.0 - outcome.score,
                if outcome.pass {
                    format!("Expected output not to satisfy '{}'", kind)
                } else {
                    String::new()
                },
            )
        } else {
            outcome
        };

        debug!(assertion = %assertion.assertion_type, pass = outcome.pass, "Assertion evaluated");

        let reason = if outcome.pass {
            "Assertion passed".to_string()
        } else {
            outcome.reason
        };
        let mut result = GradingResult::new(outcome.pass, outcome.score, reason)
            .with_assertion(assertion.clone());
        result.token_usage = usage;
        result
    }

    fn evaluate(
        &self,
        source: &str,
        output: &Value,
        context: &AssertionContext<'_>,
    ) -> Result<Value, String> {
        let mut bindings = Map::new();
        bindings.insert("output".to_string(), output.clone());
        bindings.insert("context".to_string(), context.to_value());
        self.evaluator
            .evaluate(source, &bindings)
            .map_err(|e| e.to_string())
    }

    fn expression_check(
        &self,
        source: &str,
        output: &Value,
        threshold: Option<f64>,
        context: &AssertionContext<'_>,
    ) -> CheckOutcome {
        match self.evaluate(source, output, context) {
            Ok(Value::Bool(pass)) => {
                CheckOutcome::new(pass, format!("Custom function returned false: {}", source))
            }
            Ok(Value::Number(n)) => {
                let score = n.as_f64().unwrap_or(0.0);
                let pass = match threshold {
                    Some(threshold) => score >= threshold,
                    None => score > 0.0,
                };
                CheckOutcome::scored(
                    pass,
                    score,
                    format!("Custom function returned score {}", score),
                )
            }
            Ok(Value::Object(map)) if map.contains_key("pass") || map.contains_key("score") => {
                checks::verdict(&map)
            }
            Ok(other) => CheckOutcome::new(
                is_truthy(&other),
                format!("Custom function returned {}", value_to_string(&other)),
            ),
            Err(e) => CheckOutcome::new(false, format!("Custom function threw error: {}", e)),
        }
    }
}

/// Weighted combination of per-assertion results
///
/// Zero-weight assertions are reported but do not affect the outcome.
/// Named scores average over assertions sharing a metric.
fn combine(components: Vec<GradingResult>, threshold: Option<f64>) -> GradingResult {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut all_pass = true;
    let mut failure = None;
    let mut usage: Option<TokenCounts> = None;
    let mut metric_sums: NamedScores = NamedScores::new();
    let mut metric_counts: NamedScores = NamedScores::new();

    for component in &components {
        let assertion = component.assertion.as_ref();
        let weight = assertion.map(Assertion::weight).unwrap_or(1.0);

        weighted += weight * component.score;
        total_weight += weight;
        if weight > 0.0 && !component.pass {
            all_pass = false;
            failure.get_or_insert_with(|| component.reason.clone());
        }

        if let Some(metric) = assertion.and_then(|a| a.metric.as_ref()) {
            *metric_sums.entry(metric.clone()).or_default() += component.score;
            *metric_counts.entry(metric.clone()).or_default() += 1.0;
        }

        if let Some(counts) = &component.token_usage {
            usage.get_or_insert_with(TokenCounts::default).add(counts);
        }
    }

    let score = if total_weight > 0.0 {
        weighted / total_weight
    } else if all_pass {
        1.0
    } else {
        0.0
    };

    let mut pass = all_pass;
    let mut reason = failure.unwrap_or_else(|| "All assertions passed".to_string());
    if let Some(threshold) = threshold {
        if score < threshold {
            if pass {
                reason = format!(
                    "Aggregate score {:.2} < {:.2} threshold",
                    score, threshold
                );
            }
            pass = false;
        }
    }

    let named_scores = metric_sums
        .into_iter()
        .map(|(metric, sum)| {
            let count = metric_counts.get(&metric).copied().unwrap_or(1.0);
            (metric, sum / count)
        })
        .collect();

    GradingResult {
        pass,
        score,
        reason,
        named_scores,
        token_usage: usage,
        component_results: components,
        assertion: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{MockProvider, ProviderResponse};

    fn provider() -> ProviderInfo {
        ProviderInfo {
            id: "mock".to_string(),
            label: None,
        }
    }

    async fn run(test: &TestCase, output: Value) -> GradingResult {
        run_with(&AssertionRunner::default(), test, output, 0).await
    }

    async fn run_with(
        runner: &AssertionRunner,
        test: &TestCase,
        output: Value,
        latency_ms: u64,
    ) -> GradingResult {
        let vars = Vars::new();
        let provider = provider();
        let context = AssertionContext {
            prompt: "prompt",
            vars: &vars,
            provider: &provider,
            latency_ms,
        };
        runner.run(test, &output, &context).await
    }

    #[tokio::test]
    async fn test_no_assertions_pass() {
        let result = run(&TestCase::new(), json!("anything")).await;
        assert!(result.pass);
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_all_must_pass() {
        let test = TestCase::new()
            .with_assertion(Assertion::contains("Paris"))
            .with_assertion(Assertion::new("icontains").with_value("FRANCE"));

        assert!(run(&test, json!("Paris, France")).await.pass);

        let failed = run(&test, json!("Lyon, France")).await;
        assert!(!failed.pass);
        assert_eq!(failed.score, 0.5);
        assert_eq!(failed.reason, "Expected output to contain \"Paris\"");
        assert_eq!(failed.component_results.len(), 2);
    }

    #[tokio::test]
    async fn test_negated_assertion() {
        let test = TestCase::new().with_assertion(Assertion::new("not-contains").with_value("sorry"));
        assert!(run(&test, json!("Here it is")).await.pass);

        let failed = run(&test, json!("I'm sorry")).await;
        assert!(!failed.pass);
        assert!(failed.reason.contains("not to satisfy 'contains'"));
    }

    #[tokio::test]
    async fn test_weighted_score_and_threshold() {
        let test = TestCase::new()
            .with_assertion(Assertion::contains("a").with_weight(3.0))
            .with_assertion(Assertion::contains("zzz").with_weight(1.0))
            .with_threshold(0.7);

        let result = run(&test, json!("abc")).await;
        assert_eq!(result.score, 0.75);
        assert!(!result.pass);

        let zero_weight = TestCase::new()
            .with_assertion(Assertion::contains("a"))
            .with_assertion(Assertion::contains("zzz").with_weight(0.0));
        assert!(run(&zero_weight, json!("abc")).await.pass);
    }

    #[tokio::test]
    async fn test_threshold_failure_reason() {
        let test = TestCase::new()
            .with_assertion(Assertion::new("javascript").with_value("0.4").with_threshold(0.1))
            .with_threshold(0.5);

        let result = run(&test, json!("x")).await;
        assert!(!result.pass);
        assert!(result.reason.contains("threshold"));
    }

    #[tokio::test]
    async fn test_named_scores_average_per_metric() {
        let test = TestCase::new()
            .with_assertion(Assertion::contains("a").with_metric("accuracy"))
            .with_assertion(Assertion::contains("zzz").with_metric("accuracy"))
            .with_assertion(Assertion::contains("b").with_metric("style"));

        let result = run(&test, json!("abc")).await;
        assert_eq!(result.named_scores.get("accuracy"), Some(&0.5));
        assert_eq!(result.named_scores.get("style"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_expression_assertions() {
        let bool_test =
            TestCase::new().with_assertion(Assertion::new("javascript").with_value("output.length > 3"));
        assert!(run(&bool_test, json!("long text")).await.pass);
        assert!(!run(&bool_test, json!("ab")).await.pass);

        let scored = TestCase::new().with_assertion(
            Assertion::new("javascript")
                .with_value("output.length / 10")
                .with_threshold(0.5),
        );
        let result = run(&scored, json!("123456")).await;
        assert!(result.pass);
        assert_eq!(result.score, 0.6);

        let broken =
            TestCase::new().with_assertion(Assertion::new("javascript").with_value("nope()"));
        let result = run(&broken, json!("x")).await;
        assert!(!result.pass);
        assert!(result.reason.contains("threw error"));
    }

    #[tokio::test]
    async fn test_assertion_transform() {
        let test = TestCase::new().with_assertion(
            Assertion::equals("HELLO").with_transform("output.toUpperCase()"),
        );
        assert!(run(&test, json!("hello")).await.pass);
    }

    #[tokio::test]
    async fn test_unknown_type_and_missing_value_fail() {
        let unknown = TestCase::new().with_assertion(Assertion::new("sentiment").with_value("x"));
        let result = run(&unknown, json!("x")).await;
        assert!(!result.pass);
        assert!(result.reason.contains("sentiment"));

        let missing = TestCase::new().with_assertion(Assertion::new("contains"));
        assert!(!run(&missing, json!("x")).await.pass);
    }

    #[tokio::test]
    async fn test_latency_assertion() {
        let test = TestCase::new().with_assertion(Assertion::new("latency").with_threshold(100.0));
        let runner = AssertionRunner::default();
        assert!(run_with(&runner, &test, json!("x"), 50).await.pass);
        assert!(!run_with(&runner, &test, json!("x"), 500).await.pass);
    }

    #[tokio::test]
    async fn test_llm_rubric_accumulates_grading_usage() {
        let grader = MockProvider::new("grader").with_response(
            ProviderResponse::output("{\"pass\": true, \"score\": 1, \"reason\": \"ok\"}")
                .with_token_usage(TokenCounts::new(8, 2)),
        );
        let runner = AssertionRunner::default()
            .with_graders(GradingProviders::new().with_default(Arc::new(grader)));
        let test = TestCase::new()
            .with_assertion(Assertion::llm_rubric("is friendly"))
            .with_assertion(Assertion::llm_rubric("is short"));

        let result = run_with(&runner, &test, json!("hi!"), 0).await;
        assert!(result.pass);
        assert_eq!(result.token_usage.map(|u| u.total), Some(20));
    }

    #[tokio::test]
    async fn test_llm_rubric_without_grader_fails() {
        let test = TestCase::new().with_assertion(Assertion::llm_rubric("is friendly"));
        let result = run(&test, json!("hi")).await;
        assert!(!result.pass);
        assert!(result.reason.contains("grading provider"));
    }
}
