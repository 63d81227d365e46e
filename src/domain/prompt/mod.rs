//! Prompt domain - templates, generation functions and hosted prompt sources

mod entity;
mod integration;
mod template;

pub use entity::Prompt;
pub use integration::{
    hosted_prompt_scheme, PromptFunction, PromptIntegration, RESERVED_PROMPT_SCHEMES,
};
pub use template::{
    has_unterminated_tag, wrap_raw, TemplateEngine, TemplateError, TemplateFilters,
};
