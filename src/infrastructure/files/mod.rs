//! File loading and variable materialization

mod functions;
mod local;
mod materializer;

pub use functions::{FnVarFunction, VarFunctionRegistry};
pub use local::LocalFileLoader;
pub use materializer::FileMaterializer;
