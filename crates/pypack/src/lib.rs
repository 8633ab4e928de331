pub mod assembler;
pub mod config;
pub mod descriptor;
pub mod dialect;
pub mod error;
pub mod graph_builder;
pub mod import_rewriter;
pub mod insertion;
pub mod locator;
pub mod manifest;
pub mod naming;
pub mod orchestrator;
pub mod resolver;
pub mod types;

pub use error::BundleError;
pub use orchestrator::{BundleOrchestrator, bundle};
