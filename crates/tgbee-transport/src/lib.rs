//! # tgbee transport
//!
//! Network implementations of the collaborators the dispatch engine talks
//! through.
//!
//! ## Features
//!
//! - `http-client`: [`BotApiClient`], implementing both the outbound
//!   [`Api`](tgbee_core::Api) and the long-poll
//!   [`UpdateFetcher`](tgbee_core::UpdateFetcher)
//! - `http-server`: [`WebhookServer`], receiving pushed updates and feeding a
//!   [`PushHandle`](tgbee_framework::PushHandle)
//! - `full`: both
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  tgbee-framework     │  (engine, ingestion sources)
//! ├──────────────────────┤
//! │  tgbee-core          │  (Api / UpdateFetcher traits)
//! ├──────────────────────┤
//! │  tgbee-transport     │  <- This crate (implementations)
//! ├──────────────────────┤
//! │  Network (HTTPS)     │
//! └──────────────────────┘
//! ```

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(feature = "http-client")]
pub use http::{BotApiClient, BotApiClientBuilder};

#[cfg(feature = "http-server")]
pub use http::{SECRET_TOKEN_HEADER, WebhookConfig, WebhookListener, WebhookServer};
