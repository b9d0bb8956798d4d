//! HTTP transports.

#[cfg(feature = "http-client")]
mod client;
#[cfg(feature = "http-client")]
pub use client::{BotApiClient, BotApiClientBuilder};

#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::{SECRET_TOKEN_HEADER, WebhookConfig, WebhookListener, WebhookServer};
