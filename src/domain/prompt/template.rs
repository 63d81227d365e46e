//! Template engine contract
//!
//! Templates use `{{ name }}` placeholders with optional filters
//! (`{{ name | upper }}`) and `{% raw %}...{% endraw %}` literal blocks.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde_json::Value;
use thiserror::Error;

use crate::domain::DomainError;

/// User-defined filters: filter name to an expression over `value`
pub type TemplateFilters = BTreeMap<String, String>;

/// Template processing errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("Unterminated tag starting at offset {offset}")]
    UnterminatedTag { offset: usize },

    #[error("Unsupported tag: {tag}")]
    UnsupportedTag { tag: String },

    #[error("Unknown filter: {name}")]
    UnknownFilter { name: String },

    #[error("Filter '{name}' failed: {message}")]
    FilterFailed { name: String, message: String },

    #[error("Template parsing error: {message}")]
    ParseError { message: String },
}

impl From<TemplateError> for DomainError {
    fn from(err: TemplateError) -> Self {
        DomainError::template(err.to_string())
    }
}

/// Renders a template string against a JSON context
pub trait TemplateEngine: Send + Sync + Debug {
    fn render_string(
        &self,
        template: &str,
        context: &Value,
        filters: &TemplateFilters,
    ) -> Result<String, TemplateError>;
}

/// Wrap a fragment in a literal block so it renders verbatim
pub fn wrap_raw(fragment: &str) -> String {
    format!("{{% raw %}}{}{{% endraw %}}", fragment)
}

/// Whether the text contains a template tag opener without its closer
pub fn has_unterminated_tag(text: &str) -> bool {
    [("{{", "}}"), ("{%", "%}"), ("{#", "#}")]
        .iter()
        .any(|(open, close)| match text.rfind(open) {
            Some(start) => !text[start + open.len()..].contains(close),
            None => false,
        })
}
