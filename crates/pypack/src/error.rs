//! Error taxonomy for bundling failures.
//!
//! Every variant aborts the current run. They travel inside `anyhow::Error`
//! so that context can be attached on the way up, and callers that care about
//! the kind of failure can `downcast_ref::<BundleError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("could not find library `{name}` in any search root (a {manifest} must exist)")]
    LibraryNotFound { name: String, manifest: &'static str },

    #[error("could not find `{entry}` in `{enclosing}`")]
    EntryNotFound { entry: String, enclosing: String },

    #[error("two different definitions detected for `{name}` ({first} vs {second})")]
    ConflictingDefinition {
        name: String,
        first: String,
        second: String,
    },

    #[error("`{name}` is not a valid {what} identifier")]
    InvalidIdentifier { name: String, what: &'static str },

    #[error("unsupported dialect `{0}` (expected one of: 2.7, legacy, 3.5, modern)")]
    UnsupportedDialect(String),

    #[error("malformed manifest {}: {reason}", path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("circular manifest reference: {}", chain.join(" -> "))]
    CircularReference { chain: Vec<String> },
}

impl BundleError {
    /// Whether this is one of the "not found" failures
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::LibraryNotFound { .. } | Self::EntryNotFound { .. })
    }
}
