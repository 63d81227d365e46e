//! Suite domain - the evaluated suite and run summaries

mod entity;
mod summary;

pub use entity::{DerivedMetric, TestSuite};
pub use summary::{CompletedPrompt, EvaluateStats, EvaluateSummary, PromptMetrics};
