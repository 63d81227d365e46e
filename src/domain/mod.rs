//! Domain layer - evaluation entities and collaborator contracts

pub mod error;
pub mod expression;
pub mod extension;
pub mod files;
pub mod prompt;
pub mod provider;
pub mod sink;
pub mod suite;
pub mod test_case;
pub mod vars;

pub use error::DomainError;
pub use expression::{is_truthy, ExpressionError, ExpressionEvaluator};
pub use extension::{Extension, HookName};
pub use files::{FileKind, FileLoader, PdfExtractor, VarFunction};
pub use prompt::{
    Prompt, PromptFunction, PromptIntegration, TemplateEngine, TemplateError, TemplateFilters,
};
pub use provider::{
    ApiProvider, CallContext, CallOptions, ConversationTurn, ProviderInfo, ProviderResponse,
    TokenCounts, TokenUsage,
};
pub use sink::ResultSink;
pub use suite::{CompletedPrompt, DerivedMetric, EvaluateStats, EvaluateSummary, PromptMetrics, TestSuite};
pub use test_case::{
    Assertion, AssertionKind, EvaluateResult, GradingResult, NamedScores, ResultFailureReason,
    Scenario, TestCase, TestOptions,
};
pub use vars::Vars;
