//! PMP LLM Eval
//!
//! Evaluation core for running prompts against LLM providers:
//! - Cartesian expansion and cross-resolution of test variables
//! - Prompt rendering with file, function and hosted-prompt references
//! - Bounded-concurrency execution with per-call and whole-run timeouts
//! - Assertions, grading providers, scoring functions and derived metrics
//! - Extension hooks around the run and each unit

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;
pub use domain::{
    ApiProvider, DomainError, EvaluateResult, EvaluateSummary, Prompt, ResultSink, TestCase,
    TestSuite,
};
pub use infrastructure::evaluator::{EvaluateOptions, Evaluator};
pub use infrastructure::sink::InMemoryResultSink;
