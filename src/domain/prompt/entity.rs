//! Prompt entity

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PromptFunction;

/// Immutable prompt template descriptor
#[derive(Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Raw template text
    pub raw: String,

    /// Display label, also used by provider allow-lists
    pub label: String,

    /// Stable identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Config overrides merged into the provider call context
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,

    /// Generation function replacing template rendering
    #[serde(skip)]
    pub function: Option<Arc<dyn PromptFunction>>,
}

impl Prompt {
    /// Create a prompt whose label is its raw text
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            label: raw.clone(),
            raw,
            id: None,
            config: Map::new(),
            function: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_function(mut self, function: Arc<dyn PromptFunction>) -> Self {
        self.function = Some(function);
        self
    }

    /// Identity used in conversation keys
    pub fn identity(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.label)
    }

    /// Whether two prompts describe the same template
    pub fn same_template(&self, other: &Prompt) -> bool {
        self.raw == other.raw && self.label == other.label
    }
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("label", &self.label)
            .field("id", &self.id)
            .field("raw", &self.raw)
            .field("has_function", &self.function.is_some())
            .finish()
    }
}

impl PartialEq for Prompt {
    fn eq(&self, other: &Self) -> bool {
        self.same_template(other) && self.id == other.id && self.config == other.config
    }
}
