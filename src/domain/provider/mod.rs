//! Provider capability - the call contract every evaluated model exposes

mod provider;
mod response;

pub use provider::{ApiProvider, CallContext, CallOptions, ConversationTurn, ProviderInfo};
pub use response::{ProviderResponse, TokenCounts, TokenUsage};

#[cfg(test)]
pub use provider::mock::MockProvider;
