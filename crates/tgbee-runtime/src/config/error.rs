//! Configuration errors.
//!
//! Validation errors name the offending key in its dotted form
//! (`polling.limit`, `webhook.port`), the same path a `TGBEE_` variable
//! would use with `__` in place of the dots.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// No enabled format feature reads this extension.
    #[error("no enabled configuration format reads `.{0}` files")]
    UnsupportedFormat(String),

    /// The merged providers do not fit the schema.
    #[error(transparent)]
    Extract(#[from] figment::Error),

    #[error("`{key}` is required")]
    MissingField { key: String },

    #[error("`{key}`: {reason}")]
    Invalid { key: String, reason: String },

    #[error("`{key}` = {url:?} is not usable: {reason}")]
    InvalidUrl {
        key: String,
        url: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn missing_field(key: impl Into<String>) -> Self {
        Self::MissingField { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_url(
        key: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidUrl {
            key: key.into(),
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// The dotted key the error is about, if it is about one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::MissingField { key } | Self::Invalid { key, .. } | Self::InvalidUrl { key, .. } => {
                Some(key)
            }
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
