//! # Application Errors
//!
//! Everything the binary can fail with. Resolution errors from the core pass
//! through unchanged.

use modlink_core::ResolveError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the `modlink` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid entry '{entry}': {reason}")]
    InvalidEntry { entry: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Run incomplete: {failed} module(s) failed, {pending} module(s) pending")]
    Incomplete { failed: usize, pending: usize },
}
