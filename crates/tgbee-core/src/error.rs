//! Error types for the core crate.

use std::fmt::Display;

use thiserror::Error;

/// Errors returned by the outbound [`Api`](crate::Api) and the
/// [`UpdateFetcher`](crate::UpdateFetcher) collaborators.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced a response (connection, TLS, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote service answered with `ok: false`.
    #[error("api error {code}: {description}")]
    Api {
        /// Error code reported by the service.
        code: i32,
        /// Human-readable description.
        description: String,
        /// Seconds to wait before retrying, when the service asks for it.
        retry_after: Option<u64>,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// No transport has been configured for this handle.
    #[error("api client is not configured")]
    NotConfigured,
}

impl ApiError {
    /// Creates a transport error from any displayable cause.
    pub fn transport(err: impl Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Creates a decode error from any displayable cause.
    pub fn decode(err: impl Display) -> Self {
        Self::Decode(err.to_string())
    }

    /// Returns `true` if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Api { code, .. } => *code == 429 || *code >= 500,
            Self::Decode(_) | Self::NotConfigured => false,
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Returned when parsing an [`UpdateType`](crate::UpdateType) from an
/// unrecognised name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown update type: {0}")]
pub struct UnknownUpdateType(pub String);
