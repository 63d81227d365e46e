//! Sandboxed expression language for transforms, filters and scoring
//!
//! A small JavaScript-like subset: literals, template strings, member and
//! index access, arithmetic, comparison, logical and ternary operators,
//! common string/array methods, `JSON`, `Math` and `Object` helpers, and an
//! optional function-body form (`const x = ...; return x`). Scripts only see
//! the bindings they are given.

mod ast;
mod builtins;
mod interpreter;
mod parser;

use serde_json::{Map, Value};

use crate::domain::expression::{ExpressionError, ExpressionEvaluator};

pub use builtins::to_display;
use interpreter::Interpreter;
use parser::parse_program;

/// Default [`ExpressionEvaluator`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for ScriptEvaluator {
    fn evaluate(
        &self,
        source: &str,
        bindings: &Map<String, Value>,
    ) -> Result<Value, ExpressionError> {
        let program = parse_program(source.trim())?;
        Interpreter::new(bindings).run(&program)
    }
}
