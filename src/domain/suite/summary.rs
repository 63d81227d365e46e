//! Run statistics and per-prompt aggregates

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::prompt::Prompt;
use crate::domain::provider::TokenUsage;
use crate::domain::test_case::{EvaluateResult, NamedScores, ResultFailureReason};

/// Aggregated metrics of one prompt on one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetrics {
    pub score: f64,
    pub test_pass_count: u64,
    pub test_fail_count: u64,
    pub test_error_count: u64,
    pub assert_pass_count: u64,
    pub assert_fail_count: u64,
    pub total_latency_ms: u64,
    pub token_usage: TokenUsage,
    pub named_scores: NamedScores,
    pub named_scores_count: BTreeMap<String, u64>,
}

impl PromptMetrics {
    pub fn record(&mut self, result: &EvaluateResult) {
        self.score += result.score;
        match result.failure_reason {
            ResultFailureReason::None if result.success => self.test_pass_count += 1,
            ResultFailureReason::Error => self.test_error_count += 1,
            _ => self.test_fail_count += 1,
        }

        if let Some(grading) = &result.grading_result {
            for component in &grading.component_results {
                if component.pass {
                    self.assert_pass_count += 1;
                } else {
                    self.assert_fail_count += 1;
                }
            }
        }

        self.total_latency_ms += result.latency_ms;
        self.token_usage.add(&result.token_usage);

        for (name, value) in &result.named_scores {
            *self.named_scores.entry(name.clone()).or_default() += value;
            *self.named_scores_count.entry(name.clone()).or_default() += 1;
        }
    }
}

/// A prompt as run against one provider, with its metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPrompt {
    #[serde(flatten)]
    pub prompt: Prompt,
    /// Provider display name
    pub provider: String,
    pub metrics: PromptMetrics,
}

impl CompletedPrompt {
    pub fn new(prompt: Prompt, provider: impl Into<String>) -> Self {
        Self {
            prompt,
            provider: provider.into(),
            metrics: PromptMetrics::default(),
        }
    }
}

/// Outcome counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateStats {
    pub successes: u64,
    pub failures: u64,
    pub errors: u64,
    pub token_usage: TokenUsage,
}

impl EvaluateStats {
    pub fn record(&mut self, result: &EvaluateResult) {
        if result.success {
            self.successes += 1;
        } else if result.failure_reason == ResultFailureReason::Error {
            self.errors += 1;
        } else {
            self.failures += 1;
        }
        self.token_usage.add(&result.token_usage);
    }
}

/// Finalized run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateSummary {
    pub timestamp: DateTime<Utc>,
    pub results: Vec<EvaluateResult>,
    pub prompts: Vec<CompletedPrompt>,
    pub stats: EvaluateStats,
    /// Set when the whole-run deadline cut the run short
    #[serde(default)]
    pub timed_out: bool,
}

impl EvaluateSummary {
    pub fn new(results: Vec<EvaluateResult>, prompts: Vec<CompletedPrompt>) -> Self {
        let mut stats = EvaluateStats::default();
        for result in &results {
            stats.record(result);
        }
        Self {
            timestamp: Utc::now(),
            results,
            prompts,
            stats,
            timed_out: false,
        }
    }
}
