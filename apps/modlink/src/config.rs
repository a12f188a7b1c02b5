//! # Application Configuration
//!
//! Optional TOML file with a `[resolver]` table (handed to the core as-is)
//! and a `[loader]` table for the fetchers.
//!
//! ```toml
//! [resolver]
//! cycle_policy = "break"
//! failure_policy = "propagate"
//!
//! [loader]
//! max_source_bytes = 65536
//! ```

use crate::error::AppError;
use modlink_core::ResolverConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "modlink.toml";

/// Default cap on the size of one unit's source (1 MiB).
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 1024 * 1024;

/// Full application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub resolver: ResolverConfig,
    pub loader: LoaderConfig,
}

/// Fetcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Sources larger than this fail to load.
    pub max_source_bytes: u64,
    /// `User-Agent` sent with HTTP requests.
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            user_agent: format!("modlink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AppConfig {
    /// Parse a config document.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|source| AppError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config.
    ///
    /// An explicit path must exist. Without one, `modlink.toml` is read if
    /// present and defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    tracing::debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|source| AppError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::from_toml_str(&text, &path)
    }
}

// =============================================================================
// TESTS
// =============================================================================
