//! Runtime error types.

use tgbee_core::ApiError;
use tgbee_framework::{EngineError, FrameworkError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Plugin loading failed as a whole.
    #[error(transparent)]
    Framework(#[from] FrameworkError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A startup call to the Bot API failed.
    #[error("Bot API error: {0}")]
    Api(#[from] ApiError),

    /// The webhook listener could not bind.
    #[error("Failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// The configured ingestion mode needs a transport feature that is not
    /// compiled in.
    #[error("Transport `{0}` is not available; enable the matching cargo feature")]
    TransportUnavailable(&'static str),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
