//! Template engine and prompt rendering

mod engine;
mod renderer;

pub use engine::SimpleTemplateEngine;
pub use renderer::{PromptRenderer, RenderedPrompt};
