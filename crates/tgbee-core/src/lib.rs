//! # tgbee core
//!
//! Data model and collaborator traits shared by every tgbee crate.
//!
//! - [`Update`] / [`UpdateKind`]: the immutable inbound event, decoded from
//!   the Bot API JSON object.
//! - [`UpdateType`] / [`TypeSet`]: the variant tag the handler registry
//!   partitions by, and a compact set of tags used for static compatibility
//!   checks.
//! - [`Api`] / [`ApiExt`]: the outbound request channel handlers use to
//!   send, reply and answer.
//! - [`UpdateFetcher`]: the pull transport consumed by the polling source.
//!
//! Nothing in this crate performs I/O; transports live in `tgbee-transport`.

pub mod api;
pub mod error;
pub mod fetch;
pub mod types;
pub mod update;

pub use api::{Api, ApiExt, BoxedApi};
pub use error::{ApiError, ApiResult, UnknownUpdateType};
pub use fetch::{BoxedFetcher, GetUpdates, UpdateFetcher};
pub use types::*;
pub use update::{TypeSet, Update, UpdateKind, UpdateType};
