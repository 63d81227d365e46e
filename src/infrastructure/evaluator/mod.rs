//! Evaluation run: unit execution and orchestration

mod options;
mod orchestrator;
mod progress;
mod prompt_filter;
mod run_eval;
mod state;

pub use options::{EvaluateOptions, ProgressCallback};
pub use orchestrator::Evaluator;
pub use progress::{calculate_threads_per_bar, ProgressReporter};
pub use prompt_filter::{is_allowed_prompt, prompts_for_provider};
pub use run_eval::{run_eval, EvalUnit, RunEvalContext};
pub use state::RunState;
