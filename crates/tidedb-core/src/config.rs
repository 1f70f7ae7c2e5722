//! Module: config
//! Responsibility: storage tuning knobs and their TOML loading.
//! Does not own: schema or per-collection layout.
//! Boundary: read once when a storage registry is built; immutable afterwards.

use crate::error::InternalError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::config_invalid(err.to_string())
    }
}

///
/// StorageSettings
///
/// Every field has a default, so an empty TOML document is valid.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    /// Tombstones purged per cleanup call.
    pub cleanup_batch_size: usize,

    /// Bound of each change-stream subscriber channel.
    pub change_buffer_capacity: usize,

    /// Event bulks retained for subscribe-from-checkpoint.
    pub replay_capacity: usize,

    /// Torn-read retries before a reader falls back to the write queue.
    pub max_read_retries: u32,

    /// Upper bound on one persisted document row.
    pub max_document_bytes: usize,
}

impl StorageSettings {
    pub const DEFAULT_CLEANUP_BATCH_SIZE: usize = 500;
    pub const DEFAULT_CHANGE_BUFFER_CAPACITY: usize = 256;
    pub const DEFAULT_REPLAY_CAPACITY: usize = 128;
    pub const DEFAULT_MAX_READ_RETRIES: u32 = 8;
    pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 4 * 1024 * 1024;

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("cleanup_batch_size", self.cleanup_batch_size),
            ("change_buffer_capacity", self.change_buffer_capacity),
            ("max_document_bytes", self.max_document_bytes),
        ];

        for (key, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            cleanup_batch_size: Self::DEFAULT_CLEANUP_BATCH_SIZE,
            change_buffer_capacity: Self::DEFAULT_CHANGE_BUFFER_CAPACITY,
            replay_capacity: Self::DEFAULT_REPLAY_CAPACITY,
            max_read_retries: Self::DEFAULT_MAX_READ_RETRIES,
            max_document_bytes: Self::DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let settings = StorageSettings::from_toml_str("").unwrap();

        assert_eq!(settings, StorageSettings::default());
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let settings = StorageSettings::from_toml_str(
            "cleanup_batch_size = 10\nreplay_capacity = 0\n",
        )
        .unwrap();

        assert_eq!(settings.cleanup_batch_size, 10);
        assert_eq!(settings.replay_capacity, 0);
        assert_eq!(
            settings.change_buffer_capacity,
            StorageSettings::DEFAULT_CHANGE_BUFFER_CAPACITY
        );
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = StorageSettings::from_toml_str("cleanup_batch_size = 0").unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "cleanup_batch_size",
                ..
            }
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StorageSettings::from_toml_str("bogus = 1").unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn settings_survive_toml_rendering() {
        let settings = StorageSettings {
            max_read_retries: 3,
            ..StorageSettings::default()
        };
        let rendered = settings.to_toml_string().unwrap();

        assert_eq!(StorageSettings::from_toml_str(&rendered).unwrap(), settings);
    }
}
