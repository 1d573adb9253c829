//! Reconciler configuration.
//!
//! One configuration instance binds one definitions root to one catalog
//! root. Several instances may coexist in a process (one watcher each), so
//! the type is plain data with no global state. Keys use the dotted form
//! operators know from deployment descriptors; parsing is strict and
//! validation fails closed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path;
use crate::store::Credentials;

/// Catalog root used when the configuration does not name one.
pub const DEFAULT_OAK_INDEXES_PATH: &str = "/oak:index";

/// Configuration errors. Fail closed: a config that does not validate never
/// produces a running watcher.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The TOML text did not parse or did not match the schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required path was missing or blank.
    #[error("config key {key:?} must not be blank")]
    BlankPath {
        /// Offending key.
        key: &'static str,
    },

    /// A path was present but not absolute.
    #[error("config key {key:?} must be an absolute path, got {value:?}")]
    RelativePath {
        /// Offending key.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Declarative binding of a definitions tree to an index catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsureConfig {
    /// Absolute path of the tree holding index definitions.
    #[serde(rename = "ensure-definitions.path")]
    pub definitions_path: String,

    /// Absolute path of the live index catalog.
    #[serde(rename = "oak-indexes.path", default = "default_indexes_path")]
    pub indexes_path: String,

    /// Credential mode for sessions opened on behalf of this binding.
    #[serde(rename = "session-credentials", default)]
    pub credentials: Credentials,
}

fn default_indexes_path() -> String {
    DEFAULT_OAK_INDEXES_PATH.to_string()
}

impl EnsureConfig {
    /// Creates a config for the given definitions root, catalog root
    /// defaulted.
    pub fn new(definitions_path: impl Into<String>) -> Self {
        Self {
            definitions_path: definitions_path.into(),
            indexes_path: default_indexes_path(),
            credentials: Credentials::default(),
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML, unknown keys, blank paths,
    /// or relative paths.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks both roots are non-blank absolute paths.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path("ensure-definitions.path", &self.definitions_path)?;
        validate_path("oak-indexes.path", &self.indexes_path)?;
        Ok(())
    }
}

fn validate_path(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::BlankPath { key });
    }
    if !path::is_absolute(value) {
        return Err(ConfigError::RelativePath {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}
