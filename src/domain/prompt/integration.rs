//! External prompt sources: generation functions and hosted prompt integrations

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::provider::ProviderInfo;
use crate::domain::vars::Vars;
use crate::domain::DomainError;

/// User code that produces a prompt instead of a template
///
/// The returned value may be a string, an object `{prompt, config}`, or any
/// other object (serialized to JSON). Scalars other than strings are rejected.
#[async_trait]
pub trait PromptFunction: Send + Sync + Debug {
    async fn generate(
        &self,
        vars: &Vars,
        provider: Option<&ProviderInfo>,
    ) -> anyhow::Result<Value>;
}

/// Hosted prompt store reached through a reserved scheme such as `langfuse://`
#[async_trait]
pub trait PromptIntegration: Send + Sync + Debug {
    /// Scheme handled by this integration, without `://`
    fn scheme(&self) -> &str;

    /// Fetch and render the referenced prompt
    async fn render(&self, reference: &str, vars: &Vars) -> Result<String, DomainError>;
}

/// Schemes that always denote a hosted prompt
pub const RESERVED_PROMPT_SCHEMES: &[&str] = &["langfuse", "portkey", "helicone"];

/// Scheme of a raw template if it begins with a reserved prefix
pub fn hosted_prompt_scheme(raw: &str) -> Option<&'static str> {
    RESERVED_PROMPT_SCHEMES
        .iter()
        .find(|scheme| {
            raw.strip_prefix(**scheme)
                .is_some_and(|rest| rest.starts_with("://"))
        })
        .copied()
}
