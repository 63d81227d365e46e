//! Infrastructure layer - implementations of the evaluation collaborators

pub mod assertion;
pub mod evaluator;
pub mod expression;
pub mod extension;
pub mod files;
pub mod logging;
pub mod metrics;
pub mod sink;
pub mod template;
pub mod vars;
