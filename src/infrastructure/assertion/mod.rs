//! Assertion evaluation, model grading and custom scoring

mod checks;
mod grading;
mod runner;
mod scoring;

pub use checks::extract_json;
pub use grading::{grade_rubric, GradingProviders};
pub use runner::{AssertionContext, AssertionRunner};
pub use scoring::apply_scoring_function;
