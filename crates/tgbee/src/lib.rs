//! # tgbee
//!
//! An update dispatch engine for Telegram-style bots.
//!
//! ## Overview
//!
//! Updates arrive by long polling or on a webhook, pass through a bounded
//! queue and are routed to handlers chosen by composable filters. Handlers
//! live in groups: within a group the first matching handler wins, across
//! groups every match runs. Handlers come from plugin modules compiled into
//! the binary and selected by manifests in a plugin directory.
//!
//! ```text
//! ┌────────────────┐     ┌───────────┐     ┌──────────────────────────────┐
//! │ PollingSource  │────▶│  bounded  │────▶│ DispatchEngine               │
//! │ PushSource     │     │   queue   │     │  group 0: first match wins   │──▶ Api
//! │  (webhook)     │     └───────────┘     │  group 1: first match wins   │
//! └────────────────┘                       └──────────────────────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, plugin loading and shutdown
//! - **Filters**: `&`, `|`, `^`, `!` over predicates on updates
//! - **Handlers**: async functions (Axum-style) with extractor arguments
//! - **Plugins**: modules declared with [`define_plugin!`](prelude::define_plugin)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tgbee::prelude::*;
//!
//! async fn start(msg: Message) -> String {
//!     format!("hello, {}", msg.from_user.map(|u| u.first_name).unwrap_or_default())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = BeeRuntime::builder().build()?;
//!     runtime.register(Registration::new(filter::command(["start"]) & filter::private(), start))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default), `yaml-config`: configuration file formats
//! - `json-log`: JSON log output
//! - `http-client` (default): Bot API client for outbound calls and polling
//! - `http-server` (default): webhook receiver

pub use tgbee_core as core;
pub use tgbee_framework as framework;
pub use tgbee_runtime as runtime;
pub use tgbee_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tgbee::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use tgbee_runtime::{BeeRuntime, TgbeeConfig};

    // Plugin system
    pub use tgbee_framework::{PluginRegistrar, define_plugin};

    // Filters and registration
    pub use tgbee_framework::filter::{self, Filter};
    pub use tgbee_framework::{GroupId, Priority, Registration};

    // Handlers and extractors
    pub use tgbee_framework::handler::{Layer, ServiceBuilderExt};
    pub use tgbee_framework::{BoxError, CommandArgs, FromContext, HandlerContext};

    // Update model and outbound API
    pub use tgbee_core::{
        ApiExt, BoxedApi, CallbackQuery, Chat, InlineQuery, Message, Update, UpdateType, User,
    };
}
