//! Run options

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::EvaluationConfig;
use crate::domain::test_case::EvaluateResult;

/// Called after every unit with `(completed, total, result)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &EvaluateResult) + Send + Sync>;

/// Options of one evaluation run
#[derive(Clone)]
pub struct EvaluateOptions {
    /// Units in flight at once; values below 1 count as 1
    pub max_concurrency: usize,
    /// Per-call timeout in milliseconds, 0 disables it
    pub timeout_ms: u64,
    /// Whole-run deadline in milliseconds, 0 disables it
    pub max_eval_time_ms: u64,
    /// Delay after each non-cached call for providers without their own
    pub delay_ms: u64,
    /// Times every unit runs
    pub repeat: usize,
    /// External cancellation of the whole run
    pub abort_signal: Option<CancellationToken>,
    pub on_progress: Option<ProgressCallback>,
}

impl EvaluateOptions {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            timeout_ms: config.timeout_ms,
            max_eval_time_ms: config.max_eval_time_ms,
            delay_ms: config.delay_ms,
            repeat: config.repeat,
            abort_signal: None,
            on_progress: None,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_eval_time_ms(mut self, max_eval_time_ms: u64) -> Self {
        self.max_eval_time_ms = max_eval_time_ms;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_abort_signal(mut self, token: CancellationToken) -> Self {
        self.abort_signal = Some(token);
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize, &EvaluateResult) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self::from_config(&EvaluationConfig::default())
    }
}

impl fmt::Debug for EvaluateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluateOptions")
            .field("max_concurrency", &self.max_concurrency)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_eval_time_ms", &self.max_eval_time_ms)
            .field("delay_ms", &self.delay_ms)
            .field("repeat", &self.repeat)
            .field("has_abort_signal", &self.abort_signal.is_some())
            .field("has_progress", &self.on_progress.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_config_defaults() {
        let options = EvaluateOptions::default();
        assert_eq!(options.max_concurrency, 4);
        assert_eq!(options.timeout_ms, 0);
        assert_eq!(options.repeat, 1);
        assert!(options.on_progress.is_none());
    }

    #[test]
    fn test_builders_override_config() {
        let config = EvaluationConfig {
            max_concurrency: 8,
            ..EvaluationConfig::default()
        };
        let options = EvaluateOptions::from_config(&config)
            .with_max_concurrency(2)
            .with_timeout_ms(500)
            .with_progress(|_, _, _| {});
        assert_eq!(options.max_concurrency, 2);
        assert_eq!(options.timeout_ms, 500);
        assert!(options.on_progress.is_some());
    }
}
