//! Test case and scenario entities

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Assertion;
use crate::domain::vars::{merge_maps, Vars};

/// Per-test options; each field is overridden by the more specific layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    /// Output transform expression applied after the provider transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,

    /// Deprecated alias of `transform`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postprocess: Option<String>,

    /// Expression run over `vars` before rendering; object results are merged in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_vars: Option<String>,

    /// Grading provider id for model-graded assertions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Registered scoring function name or expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_function: Option<String>,

    /// Register name receiving this test's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_output_as: Option<String>,

    /// Keep sequence-valued vars whole instead of expanding them into combinations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_var_expansion: Option<bool>,
}

impl TestOptions {
    /// Overlay `self` on `base`, field by field
    ///
    /// A layer that sets `postprocess` does not inherit the base `transform`,
    /// so a test's legacy postprocess wins over a default transform.
    pub fn merged_over(&self, base: &TestOptions) -> TestOptions {
        let transform = match (&self.transform, &self.postprocess) {
            (Some(t), _) => Some(t.clone()),
            (None, Some(_)) => None,
            (None, None) => base.transform.clone(),
        };

        TestOptions {
            transform,
            postprocess: self.postprocess.clone().or_else(|| base.postprocess.clone()),
            transform_vars: self
                .transform_vars
                .clone()
                .or_else(|| base.transform_vars.clone()),
            provider: self.provider.clone().or_else(|| base.provider.clone()),
            scoring_function: self
                .scoring_function
                .clone()
                .or_else(|| base.scoring_function.clone()),
            store_output_as: self
                .store_output_as
                .clone()
                .or_else(|| base.store_output_as.clone()),
            disable_var_expansion: self.disable_var_expansion.or(base.disable_var_expansion),
        }
    }

    /// Output transform for this test: `transform`, else `postprocess`
    pub fn output_transform(&self) -> Option<&str> {
        self.transform.as_deref().or(self.postprocess.as_deref())
    }
}

/// A bundle of variables, assertions and options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub vars: Vars,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assert: Vec<Assertion>,

    #[serde(default)]
    pub options: TestOptions,

    /// Minimum aggregate score required to pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TestCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_vars(mut self, vars: Vars) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assert.push(assertion);
        self
    }

    pub fn with_options(mut self, options: TestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.options.transform = Some(transform.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Overlay `self` on `base`
    ///
    /// Options and scalars come from the more specific layer, `vars` and
    /// `metadata` are unioned, assertions are concatenated base first.
    pub fn merged_over(&self, base: &TestCase) -> TestCase {
        let mut assert = base.assert.clone();
        assert.extend(self.assert.iter().cloned());

        TestCase {
            description: self.description.clone().or_else(|| base.description.clone()),
            vars: merge_maps(&base.vars, &self.vars),
            assert,
            options: self.options.merged_over(&base.options),
            threshold: self.threshold.or(base.threshold),
            metadata: merge_maps(&base.metadata, &self.metadata),
        }
    }

    /// Adversarial tests treat a missing output as a successful refusal
    pub fn is_red_team(&self) -> bool {
        self.metadata.contains_key("pluginId")
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.metadata.get("conversationId").and_then(|v| v.as_str())
    }
}

/// A group of overlay configs crossed with shared tests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub config: Vec<TestCase>,

    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl Scenario {
    /// Expand into `config × tests`, each layered over `default_test`
    ///
    /// An empty `config` acts as a single empty overlay; empty `tests` yields
    /// one test per config.
    pub fn expand(&self, default_test: &TestCase) -> Vec<TestCase> {
        let empty = TestCase::default();
        let configs: Vec<&TestCase> = if self.config.is_empty() {
            vec![&empty]
        } else {
            self.config.iter().collect()
        };
        let tests: Vec<&TestCase> = if self.tests.is_empty() {
            vec![&empty]
        } else {
            self.tests.iter().collect()
        };

        let mut expanded = Vec::with_capacity(configs.len() * tests.len());
        for config in &configs {
            let layered = config.merged_over(default_test);
            for test in &tests {
                let mut merged = test.merged_over(&layered);
                if merged.description.is_none() {
                    merged.description = self.description.clone();
                }
                expanded.push(merged);
            }
        }
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_unions_vars_and_metadata() {
        let base = TestCase::new()
            .with_var("a", "base")
            .with_var("b", "base")
            .with_metadata("suite", "smoke");
        let test = TestCase::new()
            .with_var("b", "test")
            .with_metadata("owner", "qa");

        let merged = test.merged_over(&base);

        assert_eq!(merged.vars.get("a"), Some(&json!("base")));
        assert_eq!(merged.vars.get("b"), Some(&json!("test")));
        assert_eq!(merged.metadata.len(), 2);
    }

    #[test]
    fn test_merge_concatenates_assertions_base_first() {
        let base = TestCase::new().with_assertion(Assertion::contains("base"));
        let test = TestCase::new().with_assertion(Assertion::contains("test"));

        let merged = test.merged_over(&base);

        assert_eq!(merged.assert.len(), 2);
        assert_eq!(merged.assert[0].value, Some(json!("base")));
        assert_eq!(merged.assert[1].value, Some(json!("test")));
    }

    #[test]
    fn test_options_more_specific_layer_wins() {
        let base = TestOptions {
            transform: Some("output.trim()".to_string()),
            provider: Some("grader-a".to_string()),
            ..Default::default()
        };
        let specific = TestOptions {
            provider: Some("grader-b".to_string()),
            ..Default::default()
        };

        let merged = specific.merged_over(&base);

        assert_eq!(merged.transform.as_deref(), Some("output.trim()"));
        assert_eq!(merged.provider.as_deref(), Some("grader-b"));
    }

    #[test]
    fn test_postprocess_shadows_inherited_transform() {
        let base = TestOptions {
            transform: Some("'default'".to_string()),
            ..Default::default()
        };
        let specific = TestOptions {
            postprocess: Some("'legacy'".to_string()),
            ..Default::default()
        };

        let merged = specific.merged_over(&base);

        assert_eq!(merged.output_transform(), Some("'legacy'"));
    }

    #[test]
    fn test_red_team_and_conversation_id() {
        let test = TestCase::new()
            .with_metadata("pluginId", "harmful:hate")
            .with_metadata("conversationId", "c1");

        assert!(test.is_red_team());
        assert_eq!(test.conversation_id(), Some("c1"));
        assert!(!TestCase::new().is_red_team());
    }

    #[test]
    fn test_scenario_expands_configs_by_tests() {
        let scenario = Scenario {
            description: Some("languages".to_string()),
            config: vec![
                TestCase::new().with_var("language", "French"),
                TestCase::new().with_var("language", "German"),
            ],
            tests: vec![
                TestCase::new().with_var("input", "Hello"),
                TestCase::new().with_var("input", "Goodbye"),
            ],
        };
        let default_test = TestCase::new().with_var("tone", "formal");

        let tests = scenario.expand(&default_test);

        assert_eq!(tests.len(), 4);
        assert_eq!(tests[0].vars.get("language"), Some(&json!("French")));
        assert_eq!(tests[0].vars.get("input"), Some(&json!("Hello")));
        assert_eq!(tests[1].vars.get("input"), Some(&json!("Goodbye")));
        assert_eq!(tests[2].vars.get("language"), Some(&json!("German")));
        assert!(tests.iter().all(|t| t.vars.get("tone") == Some(&json!("formal"))));
        assert_eq!(tests[0].description.as_deref(), Some("languages"));
    }

    #[test]
    fn test_scenario_without_tests_yields_configs() {
        let scenario = Scenario {
            description: None,
            config: vec![TestCase::new().with_var("x", 1)],
            tests: vec![],
        };

        assert_eq!(scenario.expand(&TestCase::new()).len(), 1);
    }

    #[test]
    fn test_deserialize_camel_case() {
        let test: TestCase = serde_json::from_value(json!({
            "vars": {"q": "why"},
            "options": {"storeOutputAs": "answer", "transformVars": "vars"},
            "assert": [{"type": "contains", "value": "because"}]
        }))
        .unwrap();

        assert_eq!(test.options.store_output_as.as_deref(), Some("answer"));
        assert_eq!(test.options.transform_vars.as_deref(), Some("vars"));
        assert_eq!(test.assert.len(), 1);
    }
}
