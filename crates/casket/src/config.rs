//! Store configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `CASKET_ROOT`: Root directory for stored objects
//! - `CASKET_BASE_URL`: Public URL prefix for stored objects
//! - `CASKET_KEEP_EXTENSION`: Set to "false" to drop filename extensions
//!
//! Default root: `~/.casket/media`
//!
//! Configuration is captured once at store construction and never mutated
//! afterward, so a store can be shared freely across concurrent callers.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a content-addressable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding the sharded object tree.
    pub root: PathBuf,

    /// URL prefix that serves the files under `root`. Always normalized to
    /// end with a slash, otherwise joined URLs point at the parent.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Preserve the uploaded filename's extension on the stored name.
    /// Lets a webserver guess Content-Type; plays no part in identity.
    #[serde(default = "default_true")]
    pub keep_extension: bool,

    /// Characters per shard directory segment.
    #[serde(default = "default_shard_width")]
    pub shard_width: usize,

    /// Number of shard directory segments.
    #[serde(default = "default_shard_depth")]
    pub shard_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "/media/".to_string()
}

fn default_shard_width() -> usize {
    2
}

fn default_shard_depth() -> usize {
    2
}

/// Get the default store root (~/.casket/media).
fn default_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".casket").join("media"))
        .unwrap_or_else(|| PathBuf::from(".casket/media"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            base_url: default_base_url(),
            keep_extension: true,
            shard_width: default_shard_width(),
            shard_depth: default_shard_depth(),
        }
    }
}

impl StoreConfig {
    /// Create a config with a specific root directory and defaults for the
    /// rest.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Result<Self> {
        let root = env::var("CASKET_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_root());

        let base_url = env::var("CASKET_BASE_URL").unwrap_or_else(|_| default_base_url());

        let keep_extension = env::var("CASKET_KEEP_EXTENSION")
            .map(|v| !(v.to_lowercase() == "false" || v == "0"))
            .unwrap_or(true);

        Ok(Self {
            root,
            base_url,
            keep_extension,
            ..Self::default()
        }
        .normalized())
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[casket]` section:
    /// ```toml
    /// [casket]
    /// root = "/srv/media"
    /// base_url = "/media/"
    /// keep_extension = true
    /// shard_width = 2
    /// shard_depth = 2
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

        if let Some(section) = table.get("casket") {
            let config: StoreConfig = section
                .clone()
                .try_into()
                .context("failed to parse [casket] section")?;
            Ok(config.normalized())
        } else {
            // No [casket] section, fall back to env
            Self::from_env()
        }
    }

    /// Normalize the base URL to end with a slash. Idempotent; applied by
    /// every constructor and again by the store.
    pub fn normalized(mut self) -> Self {
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
        self
    }
}
