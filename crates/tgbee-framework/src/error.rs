//! Error types for the tgbee framework.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tgbee_core::{ApiError, TypeSet, UpdateType};

use crate::dispatcher::EngineState;
use crate::registry::GroupId;

pub use tower::BoxError;

/// Errors that can occur during context extraction.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The update variant is not one the extractor understands.
    #[error("update type mismatch: expected one of {expected:?}, got '{got}'")]
    TypeMismatch {
        /// Variants the extractor accepts.
        expected: TypeSet,
        /// Actual variant.
        got: UpdateType,
    },

    /// The update has the right variant but lacks the field.
    #[error("update has no {0}")]
    Missing(&'static str),

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// A registration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidHandlerError {
    /// The filter cannot match any update variant.
    #[error("handler `{handler}`: filter `{filter}` can never match")]
    NeverMatches { handler: String, filter: String },

    /// The handler's extractors and the filter share no update variant.
    #[error(
        "handler `{handler}` accepts {accepts:?} but its filter only applies to {filter_types:?}"
    )]
    IncompatibleTypes {
        handler: String,
        accepts: TypeSet,
        filter_types: TypeSet,
    },

    /// The handler name is empty.
    #[error("handler name must not be empty")]
    EmptyName,
}

/// Why a handler invocation did not complete successfully.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    /// The handler returned an error, or an extractor failed.
    #[error("{0}")]
    Failed(BoxError),

    /// The handler panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The handler was still running when the drain grace period ended.
    #[error("cancelled after the drain grace period")]
    Cancelled,
}

/// A handler failed while processing one update.
///
/// Recorded in the [`DispatchOutcome`](crate::DispatchOutcome) counters and
/// passed to the engine's error observer.
#[derive(Debug, Error)]
#[error("handler `{handler}` (group {group}) failed on update {update_id}: {failure}")]
pub struct HandlerExecutionError {
    pub update_id: i64,
    pub handler: Arc<str>,
    pub group: GroupId,
    pub failure: ExecutionFailure,
}

/// Why a plugin module could not be loaded.
#[derive(Debug, Error)]
pub enum PluginLoadErrorKind {
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("no plugin module named `{0}` is compiled in")]
    UnknownModule(String),

    #[error("registration failed: {0}")]
    Registration(BoxError),

    #[error("registration panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    InvalidHandler(#[from] InvalidHandlerError),
}

/// A single plugin failed to load. Never aborts loading of the others.
#[derive(Debug, Error)]
#[error("plugin {} failed to load: {kind}", .path.display())]
pub struct PluginLoadError {
    /// Manifest path, or `<builtin>/<name>` for modules loaded directly.
    pub path: PathBuf,
    pub kind: PluginLoadErrorKind,
}

impl PluginLoadError {
    pub fn new(path: impl Into<PathBuf>, kind: impl Into<PluginLoadErrorKind>) -> Self {
        Self {
            path: path.into(),
            kind: kind.into(),
        }
    }
}

/// Errors raised by the ingestion sources.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The pull transport failed. Retried with backoff by the polling source.
    #[error("failed to fetch updates: {0}")]
    Fetch(#[from] ApiError),

    /// A pushed update went backwards.
    #[error("update {update_id} arrived after update {last}")]
    OutOfOrder { update_id: i64, last: i64 },

    /// The engine no longer accepts updates.
    #[error("dispatch queue is closed")]
    Closed,

    /// The watermark could not be read or written.
    #[error("watermark store failed: {0}")]
    Watermark(#[from] std::io::Error),
}

/// Errors raised by the dispatch engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is {0}; registry changes need the idle state")]
    NotIdle(EngineState),

    #[error("engine has already been started")]
    AlreadyStarted,

    #[error("engine has stopped")]
    Stopped,

    #[error(transparent)]
    InvalidHandler(#[from] InvalidHandlerError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}

/// Top-level errors of the framework layer.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("plugin directory {} does not exist", .0.display())]
    PluginDirMissing(PathBuf),

    #[error("cannot read plugin directory {}: {source}", .path.display())]
    PluginDirRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("plugins are required but none loaded ({failed} failed)")]
    NoPluginsLoaded { failed: usize },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result type for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;
