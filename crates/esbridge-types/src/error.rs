//! Error types for settings loading and validation.

use thiserror::Error;

/// Errors raised while loading or validating [`crate::Settings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Configuration sources could not be read or merged
    #[error("Configuration error: {0}")]
    Config(String),

    /// A setting holds a value outside its allowed range
    #[error("Invalid setting {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending setting
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

impl From<config::ConfigError> for SettingsError {
    fn from(err: config::ConfigError) -> Self {
        SettingsError::Config(err.to_string())
    }
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SettingsError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
