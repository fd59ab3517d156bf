//! Core error type.
//!
//! Sub-crates define their own error enums and either convert into
//! `CoreError` via `From` impls or wrap it as one variant.  Both patterns
//! appear in this workspace; prefer whichever keeps error sites clean.

use thiserror::Error;

/// The top-level error type for `msim-core` and a common base for the rest
/// of the workspace.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The configuration document is structurally valid but semantically
    /// unusable (missing mandatory stored procedure, bad mutex strategy,
    /// inconsistent origin/destination pair, …).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for `msim-core` consumers.
pub type CoreResult<T> = Result<T, CoreError>;
