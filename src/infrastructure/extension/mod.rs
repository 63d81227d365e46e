//! Extension hook dispatch

mod runner;

pub use runner::ExtensionRunner;
