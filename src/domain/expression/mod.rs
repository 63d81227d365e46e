//! Expression evaluation contract used by transforms, filters, scoring functions
//! and derived metrics

use std::fmt::Debug;

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while evaluating a user expression
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Failed to parse expression: {0}")]
    Parse(String),

    #[error("Expression evaluation failed: {0}")]
    Evaluation(String),

    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Unsupported call: {0}")]
    UnsupportedCall(String),
}

impl ExpressionError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }
}

/// Evaluates a small, sandboxed expression against named bindings
pub trait ExpressionEvaluator: Send + Sync + Debug {
    fn evaluate(&self, source: &str, bindings: &Map<String, Value>)
        -> Result<Value, ExpressionError>;
}

/// JavaScript-like truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
