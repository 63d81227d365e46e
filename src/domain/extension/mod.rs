//! Extension domain - lifecycle hooks and their context shapes
//!
//! Hooks receive JSON contexts. `beforeAll` and `beforeEach` contexts are
//! validated against [`BeforeAllContext`] and [`BeforeEachContext`] before
//! dispatch, and values returned from those hooks must match the narrower
//! [`BeforeAllPatch`] / [`BeforeEachPatch`] shapes.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::prompt::{Prompt, TemplateFilters};
use crate::domain::suite::{CompletedPrompt, DerivedMetric, TestSuite};
use crate::domain::test_case::{EvaluateResult, Scenario, TestCase};

/// Lifecycle points at which extensions run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookName {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl HookName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeAll => "beforeAll",
            Self::BeforeEach => "beforeEach",
            Self::AfterEach => "afterEach",
            Self::AfterAll => "afterAll",
        }
    }

    /// Whether returned values may modify the context
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::BeforeAll | Self::BeforeEach)
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External code invoked at lifecycle boundaries
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name used in error messages and logs
    fn name(&self) -> &str;

    /// Handle a hook; `Ok(None)` leaves the context unchanged
    async fn call(&self, hook: HookName, context: &Value) -> anyhow::Result<Option<Value>>;
}

/// Context of the `beforeAll` hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeforeAllContext {
    pub suite: TestSuite,
}

/// Context of the `beforeEach` hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeforeEachContext {
    pub test: TestCase,
}

/// Context of the `afterEach` hook
#[derive(Debug, Clone, Serialize)]
pub struct AfterEachContext<'a> {
    pub test: &'a TestCase,
    pub result: &'a EvaluateResult,
}

/// Context of the `afterAll` hook
#[derive(Debug, Clone, Serialize)]
pub struct AfterAllContext<'a> {
    pub suite: &'a TestSuite,
    pub results: &'a [EvaluateResult],
    pub prompts: &'a [CompletedPrompt],
}

/// Suite fields a `beforeAll` hook may replace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuitePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Vec<Prompt>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<TestCase>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<Scenario>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_test: Option<TestCase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nunjucks_filters: Option<TemplateFilters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_metrics: Option<Vec<DerivedMetric>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_prompt_map: Option<BTreeMap<String, Vec<String>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redteam: Option<Value>,
}

/// Value a `beforeAll` hook may return
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeAllPatch {
    pub suite: SuitePatch,
}

/// Value a `beforeEach` hook may return
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeEachPatch {
    pub test: TestCase,
}
