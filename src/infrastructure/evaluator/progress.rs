//! Progress reporting

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use super::options::ProgressCallback;
use crate::domain::test_case::EvaluateResult;

/// Workers assigned to progress bar `index` when `total_threads` are split over `bars`
///
/// The first `total_threads % bars` bars get one extra worker.
pub fn calculate_threads_per_bar(total_threads: usize, bars: usize, index: usize) -> usize {
    if bars == 0 {
        return 0;
    }
    total_threads / bars + usize::from(index < total_threads % bars)
}

/// Counts completed units and forwards them to the progress callback
pub struct ProgressReporter {
    total: usize,
    completed: AtomicUsize,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            callback,
        }
    }

    pub fn record(&self, result: &EvaluateResult) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(completed, total = self.total, success = result.success, "Unit finished");
        if let Some(callback) = &self.callback {
            callback(completed, self.total, result);
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}
