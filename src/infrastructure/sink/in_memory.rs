//! In-memory implementation of the result sink

use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::sink::ResultSink;
use crate::domain::suite::{CompletedPrompt, EvaluateSummary};
use crate::domain::test_case::EvaluateResult;
use crate::domain::DomainError;

/// Keeps results and prompts in memory for the lifetime of the sink
#[derive(Debug, Default)]
pub struct InMemoryResultSink {
    results: RwLock<Vec<EvaluateResult>>,
    prompts: RwLock<Vec<CompletedPrompt>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn add_result(&self, result: &EvaluateResult) -> Result<(), DomainError> {
        let mut results = self
            .results
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))?;
        results.push(result.clone());
        Ok(())
    }

    async fn add_prompts(&self, prompts: &[CompletedPrompt]) -> Result<(), DomainError> {
        let mut stored = self
            .prompts
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))?;
        *stored = prompts.to_vec();
        Ok(())
    }

    async fn results(&self) -> Result<Vec<EvaluateResult>, DomainError> {
        let results = self
            .results
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))?;

        // Units complete out of order; report them in expansion order
        let mut ordered = results.clone();
        ordered.sort_by_key(|r| r.unit_idx);
        Ok(ordered)
    }

    async fn to_summary(&self) -> Result<EvaluateSummary, DomainError> {
        let results = self.results().await?;
        let prompts = self
            .prompts
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))?
            .clone();
        Ok(EvaluateSummary::new(results, prompts))
    }
}
