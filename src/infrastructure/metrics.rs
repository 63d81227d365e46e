//! Evaluation metrics recorded through the `metrics` facade
//!
//! No recorder is installed here; embedding applications choose an exporter.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::domain::test_case::{EvaluateResult, ResultFailureReason};

/// Record a finished evaluation unit
pub fn record_unit(result: &EvaluateResult, duration: Duration) {
    let provider = result.provider.id.clone();
    let labels = [
        ("provider", provider.clone()),
        ("status", unit_status(result).to_string()),
    ];

    counter!("eval_units_total", &labels).increment(1);
    histogram!("eval_unit_duration_seconds", "provider" => provider.clone())
        .record(duration.as_secs_f64());

    let usage = &result.token_usage;
    if usage.counts.prompt > 0 {
        counter!("eval_tokens_total", "provider" => provider.clone(), "kind" => "prompt")
            .increment(usage.counts.prompt);
    }
    if usage.counts.completion > 0 {
        counter!("eval_tokens_total", "provider" => provider.clone(), "kind" => "completion")
            .increment(usage.counts.completion);
    }
    if usage.assertions.total > 0 {
        counter!("eval_tokens_total", "provider" => provider, "kind" => "assertions")
            .increment(usage.assertions.total);
    }
}

fn unit_status(result: &EvaluateResult) -> &'static str {
    match (result.success, result.failure_reason) {
        (true, _) => "success",
        (false, ResultFailureReason::Error) => "error",
        (false, _) => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prompt::Prompt;
    use crate::domain::provider::{ProviderInfo, TokenUsage};
    use crate::domain::test_case::TestCase;
    use crate::domain::vars::Vars;

    fn result() -> EvaluateResult {
        EvaluateResult::pending(
            Prompt::new("p"),
            ProviderInfo {
                id: "echo".to_string(),
                label: None,
            },
            TestCase::new(),
            Vars::new(),
        )
    }

    #[test]
    fn test_unit_status() {
        let mut r = result();
        r.success = true;
        assert_eq!(unit_status(&r), "success");

        r.set_error("boom");
        assert_eq!(unit_status(&r), "error");

        r.failure_reason = ResultFailureReason::Assert;
        assert_eq!(unit_status(&r), "failure");
    }

    #[test]
    fn test_record_unit_without_recorder() {
        let mut r = result();
        r.token_usage = TokenUsage::new(5, 5);
        record_unit(&r, Duration::from_millis(12));
    }
}
