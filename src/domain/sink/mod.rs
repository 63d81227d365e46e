//! Result sink - where a run persists its results

use async_trait::async_trait;

use crate::domain::suite::{CompletedPrompt, EvaluateSummary};
use crate::domain::test_case::EvaluateResult;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Persistence for evaluation results
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist one result as soon as its unit completes
    async fn add_result(&self, result: &EvaluateResult) -> Result<(), DomainError>;

    /// Persist the prompts of the run with their final metrics
    async fn add_prompts(&self, prompts: &[CompletedPrompt]) -> Result<(), DomainError>;

    /// All persisted results
    async fn results(&self) -> Result<Vec<EvaluateResult>, DomainError>;

    /// Summary of everything persisted
    async fn to_summary(&self) -> Result<EvaluateSummary, DomainError>;
}
