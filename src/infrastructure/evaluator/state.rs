//! Mutable state shared by the units of one run
//!
//! Conversation history is keyed by provider, prompt and optional
//! conversation id. Units sharing a key see each other's turns only when they
//! run in order, which the orchestrator guarantees by running sequentially
//! whenever a prompt reads `_conversation` or a test stores its output.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::prompt::Prompt;
use crate::domain::provider::{ConversationTurn, ProviderInfo};
use crate::domain::vars::Vars;

#[derive(Debug, Default)]
pub struct RunState {
    conversations: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    registers: RwLock<Vars>,
    timed_out: AtomicBool,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_key(
        provider: &ProviderInfo,
        prompt: &Prompt,
        conversation_id: Option<&str>,
    ) -> String {
        match conversation_id {
            Some(id) => format!("{}:{}:{}", provider.display_name(), prompt.identity(), id),
            None => format!("{}:{}", provider.display_name(), prompt.identity()),
        }
    }

    pub async fn history(&self, key: &str) -> Vec<ConversationTurn> {
        self.conversations
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn push_turn(&self, key: &str, turn: ConversationTurn) {
        self.conversations
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(turn);
    }

    pub async fn registers(&self) -> Vars {
        self.registers.read().await.clone()
    }

    pub async fn store(&self, name: &str, value: Value) {
        self.registers.write().await.insert(name.to_string(), value);
    }

    pub fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }
}
