use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::ProviderResponse;
use crate::domain::prompt::Prompt;
use crate::domain::vars::Vars;
use crate::domain::DomainError;

/// One recorded exchange of a multi-turn conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub prompt: String,
    pub input: String,
    pub output: Value,
}

/// Context handed to a provider alongside the rendered prompt
#[derive(Debug, Clone)]
pub struct CallContext {
    pub vars: Vars,
    pub prompt: Prompt,
    /// Prompt-level config overrides, opaque to the core
    pub config: Map<String, Value>,
    pub conversation_history: Vec<ConversationTurn>,
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Cancelled when the call times out or the run deadline passes
    pub abort_signal: Option<CancellationToken>,
}

/// Identity of a provider as recorded in results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ProviderInfo {
    /// Label if present, otherwise id
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Trait for model providers under evaluation
#[async_trait]
pub trait ApiProvider: Send + Sync + Debug {
    /// Provider identifier
    fn id(&self) -> &str;

    /// Optional display label
    fn label(&self) -> Option<&str> {
        None
    }

    /// Fixed delay to wait after each non-cached call, in milliseconds
    fn delay_ms(&self) -> Option<u64> {
        None
    }

    /// Output transform expression applied before any test transform
    fn transform(&self) -> Option<&str> {
        None
    }

    /// Prompt labels this provider is restricted to
    fn allowed_prompts(&self) -> Option<&[String]> {
        None
    }

    /// Execute a call with the rendered prompt
    async fn call_api(
        &self,
        prompt: &str,
        context: &CallContext,
        options: &CallOptions,
    ) -> Result<ProviderResponse, DomainError>;

    /// Release provider resources at run end
    async fn cleanup(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.id().to_string(),
            label: self.label().map(str::to_string),
        }
    }
}
