//! Prompt rendering pipeline
//!
//! Materializes file variables, runs prompt functions, resolves
//! cross-variable placeholders, and renders the template with JSON-aware
//! substitution.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::SimpleTemplateEngine;
use crate::domain::prompt::{
    has_unterminated_tag, hosted_prompt_scheme, wrap_raw, Prompt, PromptIntegration,
    TemplateEngine, TemplateFilters,
};
use crate::domain::provider::ProviderInfo;
use crate::domain::vars::Vars;
use crate::domain::DomainError;
use crate::infrastructure::files::FileMaterializer;
use crate::infrastructure::vars::{resolve_vars, DEFAULT_MAX_ITERATIONS};

/// Final prompt text plus the config to pass to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub text: String,
    pub config: Map<String, Value>,
}

/// Renders prompts against variable assignments
#[derive(Debug, Clone)]
pub struct PromptRenderer {
    engine: Arc<dyn TemplateEngine>,
    materializer: FileMaterializer,
    integrations: HashMap<String, Arc<dyn PromptIntegration>>,
    max_iterations: usize,
    strip_trailing_newline: bool,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new(Arc::new(SimpleTemplateEngine::default()))
    }
}

impl PromptRenderer {
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self {
        Self {
            engine,
            materializer: FileMaterializer::default(),
            integrations: HashMap::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            strip_trailing_newline: true,
        }
    }

    pub fn with_materializer(mut self, materializer: FileMaterializer) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn with_integration(mut self, integration: Arc<dyn PromptIntegration>) -> Self {
        self.integrations
            .insert(integration.scheme().to_string(), integration);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_strip_trailing_newline(mut self, strip: bool) -> Self {
        self.strip_trailing_newline = strip;
        self
    }

    pub fn engine(&self) -> &Arc<dyn TemplateEngine> {
        &self.engine
    }

    pub fn materializer(&self) -> &FileMaterializer {
        &self.materializer
    }

    /// Render `prompt` against `vars`
    ///
    /// `vars` is updated in place: file references are replaced by their
    /// content and placeholders between variables are resolved.
    pub async fn render(
        &self,
        prompt: &Prompt,
        vars: &mut Vars,
        filters: &TemplateFilters,
        provider: Option<&ProviderInfo>,
    ) -> Result<RenderedPrompt, DomainError> {
        self.materializer
            .materialize(vars, &prompt.raw, provider)
            .await?;

        if let Some(function) = &prompt.function {
            let generated = function
                .generate(vars, provider)
                .await
                .map_err(|e| DomainError::template(format!("Prompt function failed: {}", e)))?;
            return function_output(prompt, generated);
        }

        if self.strip_trailing_newline {
            for value in vars.values_mut() {
                if let Value::String(s) = value {
                    if s.ends_with('\n') {
                        s.pop();
                    }
                }
            }
        }

        resolve_vars(vars, self.max_iterations);

        if let Some(scheme) = hosted_prompt_scheme(&prompt.raw) {
            let integration = self.integrations.get(scheme).ok_or_else(|| {
                DomainError::configuration(format!(
                    "No integration registered for '{}://' prompts",
                    scheme
                ))
            })?;
            debug!(scheme = scheme, "Delegating prompt to hosted integration");
            let text = integration.render(&prompt.raw, vars).await?;
            return Ok(RenderedPrompt {
                text,
                config: prompt.config.clone(),
            });
        }

        let text = match parse_json_template(&prompt.raw) {
            Some(structure) => {
                let context = Value::Object(vars.clone());
                let rendered = self.render_leaves(structure, &context, filters)?;
                serde_json::to_string_pretty(&rendered)
                    .map_err(|e| DomainError::internal(e.to_string()))?
            }
            None => {
                let context = Value::Object(vars.clone());
                let mut rendered_vars = Vars::new();
                for (name, value) in vars.iter() {
                    let rendered = match value {
                        Value::String(s) => {
                            let fragment = if has_unterminated_tag(s) {
                                wrap_raw(s)
                            } else {
                                s.clone()
                            };
                            Value::String(self.engine.render_string(&fragment, &context, filters)?)
                        }
                        other => other.clone(),
                    };
                    rendered_vars.insert(name.clone(), rendered);
                }
                self.engine
                    .render_string(&prompt.raw, &Value::Object(rendered_vars), filters)?
            }
        };

        Ok(RenderedPrompt {
            text,
            config: prompt.config.clone(),
        })
    }

    fn render_leaves(
        &self,
        value: Value,
        context: &Value,
        filters: &TemplateFilters,
    ) -> Result<Value, DomainError> {
        Ok(match value {
            Value::String(s) => Value::String(self.engine.render_string(&s, context, filters)?),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.render_leaves(item, context, filters))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut rendered = Map::with_capacity(map.len());
                for (key, item) in map {
                    rendered.insert(key, self.render_leaves(item, context, filters)?);
                }
                Value::Object(rendered)
            }
            other => other,
        })
    }
}

/// Only object or array templates take the structured path
fn parse_json_template(raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

fn function_output(prompt: &Prompt, generated: Value) -> Result<RenderedPrompt, DomainError> {
    match generated {
        Value::String(text) => Ok(RenderedPrompt {
            text,
            config: prompt.config.clone(),
        }),
        Value::Object(mut map) if map.contains_key("prompt") => {
            let text = match map.remove("prompt") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let mut config = prompt.config.clone();
            if let Some(Value::Object(overrides)) = map.remove("config") {
                config.extend(overrides);
            }
            Ok(RenderedPrompt { text, config })
        }
        value @ (Value::Object(_) | Value::Array(_)) => Ok(RenderedPrompt {
            text: value.to_string(),
            config: prompt.config.clone(),
        }),
        other => Err(DomainError::template(format!(
            "Prompt function must return a string or an object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prompt::PromptFunction;
    use async_trait::async_trait;
    use serde_json::json;

    fn vars(value: Value) -> Vars {
        match value {
            Value::Object(map) => map,
            _ => Vars::new(),
        }
    }

    async fn render(raw: &str, v: &mut Vars) -> Result<RenderedPrompt, DomainError> {
        PromptRenderer::default()
            .render(&Prompt::new(raw), v, &TemplateFilters::new(), None)
            .await
    }

    #[derive(Debug)]
    struct StaticFunction(Value);

    #[async_trait]
    impl PromptFunction for StaticFunction {
        async fn generate(
            &self,
            _vars: &Vars,
            _provider: Option<&ProviderInfo>,
        ) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct EchoIntegration;

    #[async_trait]
    impl PromptIntegration for EchoIntegration {
        fn scheme(&self) -> &str {
            "langfuse"
        }

        async fn render(&self, reference: &str, vars: &Vars) -> Result<String, DomainError> {
            Ok(format!("{} for {}", reference, vars["name"].as_str().unwrap_or("")))
        }
    }

    #[tokio::test]
    async fn test_renders_simple_template() {
        let mut v = vars(json!({"var1": "value1", "var2": "value2"}));
        let rendered = render("Test prompt {{var1}} {{var2}}", &mut v).await.unwrap();
        assert_eq!(rendered.text, "Test prompt value1 value2");
    }

    #[tokio::test]
    async fn test_nested_variables_are_resolved() {
        let mut v = vars(json!({"greeting": "Hi {{ name }}", "name": "Bob"}));
        let rendered = render("{{ greeting }}!", &mut v).await.unwrap();
        assert_eq!(rendered.text, "Hi Bob!");
        assert_eq!(v["greeting"], json!("Hi Bob"));
    }

    #[tokio::test]
    async fn test_unterminated_tag_in_variable_is_literal() {
        let mut v = vars(json!({"code": "use {{ carefully"}));
        let rendered = render("Code: {{ code }}", &mut v).await.unwrap();
        assert_eq!(rendered.text, "Code: use {{ carefully");
    }

    #[tokio::test]
    async fn test_trailing_newline_is_stripped_once() {
        let mut v = vars(json!({"text": "line\n\n"}));
        let rendered = render("[{{ text }}]", &mut v).await.unwrap();
        assert_eq!(rendered.text, "[line\n]");
    }

    #[tokio::test]
    async fn test_json_template_renders_string_leaves() {
        let mut v = vars(json!({"name": "Ann \"A\""}));
        let raw = r#"[{"role": "user", "content": "Hello {{ name }}"}]"#;
        let rendered = render(raw, &mut v).await.unwrap();

        let parsed: Value = serde_json::from_str(&rendered.text).unwrap();
        assert_eq!(parsed, json!([{"role": "user", "content": "Hello Ann \"A\""}]));
    }

    #[tokio::test]
    async fn test_scalar_json_is_rendered_as_text() {
        let mut v = vars(json!({}));
        assert_eq!(render("42", &mut v).await.unwrap().text, "42");
    }

    #[tokio::test]
    async fn test_prompt_function_with_config() {
        let prompt = Prompt::new("ignored")
            .with_config(vars(json!({"temperature": 0.5, "max_tokens": 10})))
            .with_function(Arc::new(StaticFunction(json!({
                "prompt": "Generated",
                "config": {"temperature": 0.2}
            }))));

        let rendered = PromptRenderer::default()
            .render(&prompt, &mut Vars::new(), &TemplateFilters::new(), None)
            .await
            .unwrap();

        assert_eq!(rendered.text, "Generated");
        assert_eq!(rendered.config["temperature"], json!(0.2));
        assert_eq!(rendered.config["max_tokens"], json!(10));
    }

    #[tokio::test]
    async fn test_prompt_function_object_and_invalid_results() {
        let object = Prompt::new("x").with_function(Arc::new(StaticFunction(json!({"a": 1}))));
        let rendered = PromptRenderer::default()
            .render(&object, &mut Vars::new(), &TemplateFilters::new(), None)
            .await
            .unwrap();
        assert_eq!(rendered.text, "{\"a\":1}");

        let number = Prompt::new("x").with_function(Arc::new(StaticFunction(json!(3))));
        assert!(PromptRenderer::default()
            .render(&number, &mut Vars::new(), &TemplateFilters::new(), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_hosted_prompt_delegates_to_integration() {
        let renderer = PromptRenderer::default().with_integration(Arc::new(EchoIntegration));
        let mut v = vars(json!({"name": "Zoe"}));

        let rendered = renderer
            .render(&Prompt::new("langfuse://greeting"), &mut v, &TemplateFilters::new(), None)
            .await
            .unwrap();
        assert_eq!(rendered.text, "langfuse://greeting for Zoe");

        let err = renderer
            .render(&Prompt::new("portkey://pp-1"), &mut v, &TemplateFilters::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_file_variables_are_replaced_in_place() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("topic.txt"), "bees\n").unwrap();

        let renderer = PromptRenderer::default().with_materializer(FileMaterializer::new(
            Arc::new(crate::infrastructure::files::LocalFileLoader::new(dir.path())),
        ));
        let mut v = vars(json!({"topic": "file://topic.txt"}));

        let rendered = renderer
            .render(&Prompt::new("About {{ topic }}"), &mut v, &TemplateFilters::new(), None)
            .await
            .unwrap();
        assert_eq!(rendered.text, "About bees");
        assert_eq!(v["topic"], json!("bees"));
    }

    #[tokio::test]
    async fn test_user_filters() {
        let mut filters = TemplateFilters::new();
        filters.insert("shout".to_string(), "value.toUpperCase() + '!'".to_string());
        let mut v = vars(json!({"word": "hey"}));

        let rendered = PromptRenderer::default()
            .render(&Prompt::new("{{ word | shout }}"), &mut v, &filters, None)
            .await
            .unwrap();
        assert_eq!(rendered.text, "HEY!");
    }
}
