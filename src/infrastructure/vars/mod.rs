//! Variable expansion and resolution

mod expander;
mod resolver;

pub use expander::expand_vars;
pub use resolver::{resolve_vars, DEFAULT_MAX_ITERATIONS};
