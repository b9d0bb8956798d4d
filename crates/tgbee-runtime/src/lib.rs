//! tgbee Runtime - Orchestration layer for tgbee bots.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`, `TgbeeConfig`)
//! - Logging configuration (`LoggingBuilder`, `SpanEvents`)
//! - Runtime orchestration (`BeeRuntime`)
//!
//! # Transports
//!
//! Unless collaborators are injected, the runtime builds them from the
//! enabled cargo features:
//!
//! - `http-client` (default): the Bot API client, used for outbound calls
//!   and long polling
//! - `http-server` (default): the webhook receiver, used in webhook mode
//!
//! ```ignore
//! use tgbee_runtime::BeeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // tgbee.toml selects the mode, the plugin directory and logging.
//!     let runtime = BeeRuntime::builder().build()?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, IngestMode, Profile, TgbeeConfig, load_config,
    load_config_from_file, validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BeeRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
