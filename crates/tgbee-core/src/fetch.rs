//! Pull transport used by the polling ingestion source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::ApiResult;
use crate::update::{Update, UpdateType};

/// Parameters of one long-poll request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetUpdates {
    /// First update identifier to return. Everything below it is confirmed.
    pub offset: Option<i64>,
    /// Maximum number of updates in the batch (1-100).
    pub limit: u32,
    /// How long the server may hold the request open.
    pub timeout: Duration,
    /// Update kinds to receive; empty means the server default.
    pub allowed_updates: Vec<UpdateType>,
}

impl Default for GetUpdates {
    fn default() -> Self {
        Self {
            offset: None,
            limit: 100,
            timeout: Duration::from_secs(30),
            allowed_updates: Vec::new(),
        }
    }
}

impl GetUpdates {
    /// Encodes the request as `getUpdates` parameters.
    pub fn to_params(&self) -> Value {
        let mut params = json!({
            "limit": self.limit,
            "timeout": self.timeout.as_secs(),
        });
        if let Some(offset) = self.offset {
            params["offset"] = Value::from(offset);
        }
        if !self.allowed_updates.is_empty() {
            params["allowed_updates"] = self
                .allowed_updates
                .iter()
                .map(|ty| Value::from(ty.as_str()))
                .collect();
        }
        params
    }
}

/// Fetches batches of decoded updates from the remote service.
///
/// Implementations block for at most roughly [`GetUpdates::timeout`] and
/// return an empty batch when nothing arrived.
#[async_trait]
pub trait UpdateFetcher: Send + Sync {
    async fn get_updates(&self, request: &GetUpdates) -> ApiResult<Vec<Update>>;
}

/// A shared, type-erased fetcher.
pub type BoxedFetcher = Arc<dyn UpdateFetcher>;

#[async_trait]
impl<F: UpdateFetcher + ?Sized> UpdateFetcher for Arc<F> {
    async fn get_updates(&self, request: &GetUpdates) -> ApiResult<Vec<Update>> {
        (**self).get_updates(request).await
    }
}
