//! Model-graded assertions

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use super::checks::{extract_json, verdict};
use crate::domain::prompt::Prompt;
use crate::domain::provider::{ApiProvider, CallContext, CallOptions};
use crate::domain::test_case::GradingResult;
use crate::domain::vars::{value_to_string, Vars};

const RUBRIC_PROMPT: &str = "You are grading output according to a user-specified rubric. \
If the statement in the rubric is true, then the output passes the test. \
You respond with a JSON object with this structure: \
{\"reason\": string, \"pass\": boolean, \"score\": number}\n\n\
<Output>\n{{output}}\n</Output>\n<Rubric>\n{{rubric}}\n</Rubric>";

/// Providers available for grading, by id, plus an optional default
#[derive(Debug, Clone, Default)]
pub struct GradingProviders {
    default: Option<Arc<dyn ApiProvider>>,
    by_id: HashMap<String, Arc<dyn ApiProvider>>,
}

impl GradingProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, provider: Arc<dyn ApiProvider>) -> Self {
        self.default = Some(provider);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ApiProvider>) -> Self {
        self.by_id.insert(provider.id().to_string(), provider);
        self
    }

    /// The provider named by a test, falling back to the default
    pub fn resolve(&self, id: Option<&str>) -> Option<Arc<dyn ApiProvider>> {
        match id {
            Some(id) => self.by_id.get(id).cloned(),
            None => self.default.clone(),
        }
    }
}

/// Grade `output` against a natural-language rubric
pub async fn grade_rubric(
    provider: &dyn ApiProvider,
    output: &str,
    rubric: &str,
    vars: &Vars,
) -> GradingResult {
    let prompt = RUBRIC_PROMPT
        .replace("{{output}}", output)
        .replace("{{rubric}}", rubric);

    let context = CallContext {
        vars: vars.clone(),
        prompt: Prompt::new(prompt.clone()).with_label("llm-rubric"),
        config: Map::new(),
        conversation_history: Vec::new(),
    };

    let response = match provider.call_api(&prompt, &context, &CallOptions::default()).await {
        Ok(response) => response,
        Err(e) => {
            warn!(provider = provider.id(), error = %e, "Rubric grading call failed");
            return GradingResult::fail(format!("LLM rubric grading failed: {}", e));
        }
    };

    let usage = response.token_usage.unwrap_or_default();
    if let Some(error) = response.error {
        return GradingResult::fail(format!("LLM rubric grading failed: {}", error))
            .with_token_usage(usage);
    }

    let parsed = match response.output {
        Some(Value::Object(map)) => Some(Value::Object(map)),
        Some(other) => extract_json(&value_to_string(&other)),
        None => None,
    };

    let Some(Value::Object(verdict_map)) = parsed else {
        return GradingResult::fail("LLM rubric grader did not return a JSON verdict")
            .with_token_usage(usage);
    };

    let outcome = verdict(&verdict_map);
    GradingResult::new(outcome.pass, outcome.score, outcome.reason).with_token_usage(usage)
}
