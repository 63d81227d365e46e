//! Evaluation result types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Assertion, TestCase};
use crate::domain::prompt::Prompt;
use crate::domain::provider::{ProviderInfo, ProviderResponse, TokenCounts, TokenUsage};
use crate::domain::vars::Vars;

/// Named metric scores collected from assertions
pub type NamedScores = BTreeMap<String, f64>;

/// Why a unit did not succeed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFailureReason {
    #[default]
    None,
    /// An assertion failed or the output was missing
    Assert,
    /// The provider, a transform, a scoring function or a timeout failed
    Error,
}

/// Outcome of grading an output, for one assertion or for the whole test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub pass: bool,
    pub score: f64,
    pub reason: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub named_scores: NamedScores,

    /// Tokens spent by grading providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenCounts>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_results: Vec<GradingResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<Assertion>,
}

impl GradingResult {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self::new(true, 1.0, reason)
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::new(false, 0.0, reason)
    }

    pub fn new(pass: bool, score: f64, reason: impl Into<String>) -> Self {
        Self {
            pass,
            score,
            reason: reason.into(),
            named_scores: NamedScores::new(),
            token_usage: None,
            component_results: Vec::new(),
            assertion: None,
        }
    }

    pub fn with_token_usage(mut self, usage: TokenCounts) -> Self {
        self.token_usage = Some(usage);
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertion = Some(assertion);
        self
    }
}

/// One executed (provider, prompt, test, repeat) unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub id: String,

    /// Position in the unit list
    pub unit_idx: usize,
    pub prompt_idx: usize,
    pub test_idx: usize,
    pub repeat_index: usize,

    pub prompt: Prompt,
    /// Prompt text as sent to the provider
    pub rendered_prompt: String,
    pub provider: ProviderInfo,
    pub test_case: TestCase,
    pub vars: Vars,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ProviderResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub success: bool,
    pub score: f64,
    pub failure_reason: ResultFailureReason,
    pub latency_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_result: Option<GradingResult>,

    #[serde(default)]
    pub named_scores: NamedScores,

    #[serde(default)]
    pub token_usage: TokenUsage,

    #[serde(default)]
    pub cached: bool,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EvaluateResult {
    /// A result for a unit with nothing recorded yet
    pub fn pending(
        prompt: Prompt,
        provider: ProviderInfo,
        test_case: TestCase,
        vars: Vars,
    ) -> Self {
        let metadata = test_case.metadata.clone();
        Self {
            id: Uuid::new_v4().to_string(),
            unit_idx: 0,
            prompt_idx: 0,
            test_idx: 0,
            repeat_index: 0,
            prompt,
            rendered_prompt: String::new(),
            provider,
            test_case,
            vars,
            response: None,
            error: None,
            success: false,
            score: 0.0,
            failure_reason: ResultFailureReason::None,
            latency_ms: 0,
            grading_result: None,
            named_scores: NamedScores::new(),
            token_usage: TokenUsage::default(),
            cached: false,
            metadata,
        }
    }

    /// Mark as a terminal error
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.success = false;
        self.score = 0.0;
        self.failure_reason = ResultFailureReason::Error;
        self.error = Some(error.into());
    }

    /// Output of the response after transforms
    pub fn output(&self) -> Option<&Value> {
        self.response.as_ref().and_then(|r| r.output.as_ref())
    }
}
