//! Configuration management
//!
//! Settings come from built-in defaults, then an optional YAML file, then
//! `TEKLINE_*` environment variables.

use crate::compiler::{
    CompileOptions, DEFAULT_BUILDER_IMAGE, DEFAULT_NAMESPACE, DEFAULT_SOURCE_DIR,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Overrides the builder image
pub const ENV_BUILDER_IMAGE: &str = "TEKLINE_BUILDER_IMAGE";

/// Older name for [`ENV_BUILDER_IMAGE`], consulted when it is unset
pub const ENV_LEGACY_BUILDER_IMAGE: &str = "BUILDER_JX_IMAGE";

/// Overrides the namespace
pub const ENV_NAMESPACE: &str = "TEKLINE_NAMESPACE";

/// Overrides the log level
pub const ENV_LOG_LEVEL: &str = "TEKLINE_LOG_LEVEL";

/// Error reading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config file
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The file is not a valid config document
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Config file
        path: PathBuf,
        /// Underlying error
        source: serde_yaml::Error,
    },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Image running the workspace preparation step
    pub builder_image: String,
    /// Source checkout directory under `/workspace`
    pub source_dir: String,
    /// Namespace for generated resources
    pub namespace: String,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            source_dir: DEFAULT_SOURCE_DIR.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads a YAML config file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults with overrides from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Applies overrides from the process environment
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; empty values are ignored
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(image) = get(ENV_BUILDER_IMAGE).or_else(|| get(ENV_LEGACY_BUILDER_IMAGE)) {
            self.builder_image = image;
        }
        if let Some(namespace) = get(ENV_NAMESPACE) {
            self.namespace = namespace;
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        self
    }

    /// Compile options for a pipeline and build
    #[must_use]
    pub fn to_compile_options(
        &self,
        pipeline_id: impl Into<String>,
        build_id: impl Into<String>,
    ) -> CompileOptions {
        CompileOptions::new(pipeline_id, build_id)
            .with_namespace(&self.namespace)
            .with_source_dir(&self.source_dir)
            .with_builder_image(&self.builder_image)
    }
}
