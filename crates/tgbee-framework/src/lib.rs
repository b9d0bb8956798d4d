//! # tgbee framework
//!
//! The update dispatch engine.
//!
//! This layer provides:
//! - A filter algebra over updates ([`filter`])
//! - Axum-style handler functions with extractors, wrapped as tower services
//! - The [`HandlerRegistry`] with priorities and mutually exclusive groups
//! - The [`DispatchEngine`] with bounded concurrency and graceful draining
//! - Plugin modules collected at link time and selected by manifests
//! - Polling and push ingestion sources
//!
//! ```text
//! PluginLoader ──▶ HandlerRegistry ──owned by──▶ DispatchEngine
//!                                                     ▲
//!                  PollingSource / PushSource ──queue─┘
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod handler;
pub mod ingest;
pub mod plugin;
pub mod registry;

pub use context::HandlerContext;
pub use dispatcher::{
    DispatchConfig, DispatchEngine, DispatchEngineBuilder, DispatchOutcome, EngineState,
    ErrorObserver, Isolation, OutcomeObserver, PendingDispatch,
};
pub use error::{
    BoxError, EngineError, ExecutionFailure, ExtractError, ExtractResult, FrameworkError,
    FrameworkResult, HandlerExecutionError, IngestionError, InvalidHandlerError, PluginLoadError,
    PluginLoadErrorKind,
};
pub use extractor::{CommandArgs, FromContext};
pub use filter::Filter;
pub use handler::{Handler, HandlerResponse, HandlerService, ServiceBuilderExt};
pub use ingest::{
    Backoff, FileWatermarkStore, MemoryWatermarkStore, PollingConfig, PollingSource, PushHandle,
    PushReceipt, PushSource, UpdateSink, UpdateSource, WatermarkStore,
};
pub use plugin::{LoadReport, PluginDescriptor, PluginLoader, PluginModule, PluginRegistrar};
pub use registry::{
    EntriesFor, GroupId, GroupOrder, HandlerEntry, HandlerHandle, HandlerRegistry, Priority,
    Registration,
};
