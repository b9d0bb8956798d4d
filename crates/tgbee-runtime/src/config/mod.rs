//! Configuration for tgbee bots.
//!
//! Layered loading (defaults, files, `TGBEE_` environment variables,
//! programmatic overrides) via figment, plus validation of the result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, DispatchSettings, IngestMode, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, PluginSettings, PollingSettings, RetryConfig, SpanEventConfig, TgbeeConfig,
    WebhookSettings,
};
pub use validation::validate_config;
