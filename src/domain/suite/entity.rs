//! Test suite entity

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::prompt::{Prompt, TemplateFilters};
use crate::domain::provider::ApiProvider;
use crate::domain::test_case::{Scenario, TestCase};

/// Metric computed from a prompt's aggregated named scores after the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    /// Expression over the named scores, e.g. `precision * recall`
    pub value: String,
}

/// Everything one evaluation run works on
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip)]
    pub providers: Vec<Arc<dyn ApiProvider>>,

    #[serde(default)]
    pub prompts: Vec<Prompt>,

    #[serde(default)]
    pub tests: Vec<TestCase>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<Scenario>,

    #[serde(default)]
    pub default_test: TestCase,

    /// User template filters; the name follows the suite file format
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nunjucks_filters: TemplateFilters,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_metrics: Vec<DerivedMetric>,

    /// Provider id or label to the prompt labels it may run
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_prompt_map: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redteam: Option<Value>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn ApiProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn with_test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_default_test(mut self, default_test: TestCase) -> Self {
        self.default_test = default_test;
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.nunjucks_filters.insert(name.into(), expression.into());
        self
    }

    pub fn with_derived_metric(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.derived_metrics.push(DerivedMetric {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Tests to run: explicit tests then scenario expansions, each over `default_test`
    ///
    /// With neither tests nor scenarios the default test runs once on its own.
    pub fn resolved_tests(&self) -> Vec<TestCase> {
        if self.tests.is_empty() && self.scenarios.is_empty() {
            return vec![self.default_test.clone()];
        }

        let mut tests: Vec<TestCase> = self
            .tests
            .iter()
            .map(|test| test.merged_over(&self.default_test))
            .collect();
        for scenario in &self.scenarios {
            tests.extend(scenario.expand(&self.default_test));
        }
        tests
    }

    /// Carry generation functions over to prompts replaced by an extension
    pub fn restore_prompt_functions(&self, prompts: &mut [Prompt]) {
        for prompt in prompts.iter_mut().filter(|p| p.function.is_none()) {
            if let Some(original) = self.prompts.iter().find(|p| p.same_template(prompt)) {
                prompt.function = original.function.clone();
            }
        }
    }
}

impl std::fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSuite")
            .field("description", &self.description)
            .field("providers", &self.providers.len())
            .field("prompts", &self.prompts)
            .field("tests", &self.tests.len())
            .field("scenarios", &self.scenarios.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolved_tests_falls_back_to_default_test() {
        let suite = TestSuite::new().with_default_test(TestCase::new().with_var("x", 1));
        let tests = suite.resolved_tests();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].vars.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_resolved_tests_layers_default_test() {
        let suite = TestSuite::new()
            .with_default_test(TestCase::new().with_var("tone", "dry"))
            .with_test(TestCase::new().with_var("topic", "cats"))
            .with_scenario(Scenario {
                description: None,
                config: vec![TestCase::new().with_var("topic", "dogs")],
                tests: vec![],
            });

        let tests = suite.resolved_tests();

        assert_eq!(tests.len(), 2);
        assert!(tests.iter().all(|t| t.vars.get("tone") == Some(&json!("dry"))));
        assert_eq!(tests[1].vars.get("topic"), Some(&json!("dogs")));
    }

    #[test]
    fn test_serialized_suite_skips_providers() {
        let suite = TestSuite::new()
            .with_prompt(Prompt::new("Hello"))
            .with_filter("shout", "value.toUpperCase()");
        let value = serde_json::to_value(&suite).unwrap();

        assert!(value.get("providers").is_none());
        assert_eq!(value["nunjucksFilters"]["shout"], json!("value.toUpperCase()"));
        assert_eq!(value["prompts"][0]["raw"], json!("Hello"));
    }
}
