use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tgbee_core::{ApiError, GetUpdates, UpdateFetcher, UpdateType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Backoff, MemoryWatermarkStore, UpdateSink, UpdateSource, WatermarkStore};
use crate::error::IngestionError;

#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Long-poll timeout passed to the fetcher.
    pub timeout: Duration,
    /// Maximum updates per batch.
    pub limit: u32,
    /// Empty means every kind the server sends by default.
    pub allowed_updates: Vec<UpdateType>,
    pub backoff: Backoff,
    /// Consecutive fetch failures before the source reports itself unhealthy.
    pub failure_threshold: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            limit: 100,
            allowed_updates: Vec::new(),
            backoff: Backoff::default(),
            failure_threshold: 3,
        }
    }
}

/// Pull-mode ingestion with an at-least-once watermark.
///
/// Each batch asks for ids above the watermark. An id is acknowledged (and
/// persisted) only after the engine has initiated its dispatch, so a crash
/// can redeliver updates but never skip them.
pub struct PollingSource<F> {
    fetcher: F,
    store: Arc<dyn WatermarkStore>,
    config: PollingConfig,
    watermark: Option<i64>,
    restored: bool,
    failures: u32,
}

impl<F: UpdateFetcher + 'static> PollingSource<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            store: Arc::new(MemoryWatermarkStore::new()),
            config: PollingConfig::default(),
            watermark: None,
            restored: false,
            failures: 0,
        }
    }

    pub fn with_store(mut self, store: impl WatermarkStore + 'static) -> Self {
        self.store = Arc::new(store);
        self.restored = false;
        self
    }

    pub fn config(mut self, config: PollingConfig) -> Self {
        self.config = config;
        self
    }

    /// Last acknowledged update id.
    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    /// Consecutive failed fetches so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Loads the watermark from the store, once.
    pub async fn restore(&mut self) -> Result<(), IngestionError> {
        if !self.restored {
            self.watermark = self.store.load().await?;
            self.restored = true;
        }
        Ok(())
    }

    fn request(&self) -> GetUpdates {
        GetUpdates {
            offset: self.watermark.map(|w| w + 1),
            limit: self.config.limit,
            timeout: self.config.timeout,
            allowed_updates: self.config.allowed_updates.clone(),
        }
    }

    /// Fetches one batch, hands it to `sink` and acknowledges it.
    ///
    /// Returns the number of updates delivered. Ids at or below the
    /// watermark are dropped even if the server returns them.
    pub async fn poll_once(&mut self, sink: &UpdateSink) -> Result<usize, IngestionError> {
        self.restore().await?;
        let mut batch = self.fetcher.get_updates(&self.request()).await?;
        batch.sort_by_key(|u| u.update_id);
        batch.dedup_by_key(|u| u.update_id);
        if let Some(w) = self.watermark {
            batch.retain(|u| u.update_id > w);
        }
        if batch.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = batch.iter().map(|u| u.update_id).collect();
        trace!(first = ids[0], count = ids.len(), "received batch");
        for update in batch {
            sink.send(update).await?;
        }
        for &id in &ids {
            sink.wait_initiated(id).await?;
            self.store.store(id).await?;
            self.watermark = Some(id);
        }
        Ok(ids.len())
    }

    async fn backoff(&mut self, err: &ApiError, shutdown: &CancellationToken) -> bool {
        self.failures += 1;
        let mut delay = self.config.backoff.delay(self.failures);
        if let ApiError::Api {
            retry_after: Some(secs),
            ..
        } = err
        {
            delay = delay.max(Duration::from_secs(*secs));
        }
        if self.failures >= self.config.failure_threshold {
            warn!(
                failures = self.failures,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "update polling is failing"
            );
        } else {
            debug!(failures = self.failures, error = %err, "fetch failed, retrying");
        }
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[async_trait]
impl<F: UpdateFetcher + 'static> UpdateSource for PollingSource<F> {
    async fn run(
        mut self: Box<Self>,
        sink: UpdateSink,
        shutdown: CancellationToken,
    ) -> Result<(), IngestionError> {
        self.restore().await?;
        info!(watermark = ?self.watermark, "update polling started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                polled = self.poll_once(&sink) => polled,
            };
            match polled {
                Ok(count) => {
                    if self.failures >= self.config.failure_threshold {
                        info!(failures = self.failures, "update polling recovered");
                    }
                    self.failures = 0;
                    if count > 0 {
                        trace!(count, watermark = ?self.watermark, "batch acknowledged");
                    }
                }
                Err(IngestionError::Fetch(err)) => {
                    if !self.backoff(&err, &shutdown).await {
                        break;
                    }
                }
                Err(IngestionError::Closed) => break,
                Err(err) => return Err(err),
            }
        }

        info!(watermark = ?self.watermark, "update polling stopped");
        Ok(())
    }
}
