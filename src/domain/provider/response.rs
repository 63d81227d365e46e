use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw token counters reported by a single call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounts {
    #[serde(default)]
    pub prompt: u64,
    #[serde(default)]
    pub completion: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub cached: u64,
    #[serde(default)]
    pub num_requests: u64,
}

impl TokenCounts {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
            cached: 0,
            num_requests: 1,
        }
    }

    pub fn add(&mut self, other: &TokenCounts) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
        self.cached += other.cached;
        self.num_requests += other.num_requests;
    }
}

/// Token usage of an evaluation unit
///
/// The top-level counters hold the primary provider call; grading calls made by
/// assertions accumulate separately under `assertions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(flatten)]
    pub counts: TokenCounts,
    #[serde(default)]
    pub assertions: TokenCounts,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            counts: TokenCounts::new(prompt, completion),
            assertions: TokenCounts::default(),
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.total
    }

    /// Provider and grading tokens together
    pub fn grand_total(&self) -> u64 {
        self.counts.total + self.assertions.total
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.counts.add(&other.counts);
        self.assertions.add(&other.assertions);
    }

    pub fn add_assertion_usage(&mut self, counts: &TokenCounts) {
        self.assertions.add(counts);
    }
}

impl From<TokenCounts> for TokenUsage {
    fn from(counts: TokenCounts) -> Self {
        Self {
            counts,
            assertions: TokenCounts::default(),
        }
    }
}

/// Response returned by a provider call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    /// Model output; `None` means the provider produced nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenCounts>,

    #[serde(default)]
    pub cached: bool,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<Value>,
}

impl ProviderResponse {
    pub fn output(output: impl Into<Value>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_token_usage(mut self, usage: TokenCounts) -> Self {
        self.token_usage = Some(usage);
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_calculation() {
        let usage = TokenUsage::new(10, 20);
        assert_eq!(usage.total(), 30);
        assert_eq!(usage.counts.num_requests, 1);
    }

    #[test]
    fn test_usage_is_additive() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage::new(5, 5));
        total.add(&TokenUsage::new(1, 2));
        total.add_assertion_usage(&TokenCounts::new(7, 3));

        assert_eq!(total.total(), 13);
        assert_eq!(total.assertions.total, 10);
        assert_eq!(total.grand_total(), 23);
        assert_eq!(total.counts.num_requests, 2);
    }

    #[test]
    fn test_response_deserializes_partial_usage() {
        let response: ProviderResponse = serde_json::from_value(json!({
            "output": "hi",
            "tokenUsage": {"total": 10, "prompt": 5, "completion": 5}
        }))
        .unwrap();

        assert_eq!(response.output, Some(json!("hi")));
        assert_eq!(response.token_usage.unwrap().total, 10);
        assert!(!response.cached);
    }
}
