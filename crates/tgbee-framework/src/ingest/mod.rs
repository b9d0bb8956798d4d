//! Ingestion sources.
//!
//! Two interchangeable ways to feed the [`DispatchEngine`](crate::DispatchEngine):
//!
//! - [`PollingSource`]: long-polls an [`UpdateFetcher`](tgbee_core::UpdateFetcher)
//!   and keeps a persisted watermark, for at-least-once delivery.
//! - [`PushSource`]: accepts updates handed over by an external receiver
//!   (a webhook server) through a [`PushHandle`].
//!
//! Both hand updates to an [`UpdateSink`] in non-decreasing `update_id` order.

mod backoff;
mod polling;
mod push;
mod watermark;

use async_trait::async_trait;
use tgbee_core::Update;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::IngestionError;

pub use backoff::Backoff;
pub use polling::{PollingConfig, PollingSource};
pub use push::{PushHandle, PushReceipt, PushSource};
pub use watermark::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};

/// Produces updates until told to stop.
#[async_trait]
pub trait UpdateSource: Send + 'static {
    /// Feeds `sink` until `shutdown` is cancelled or the source is exhausted.
    async fn run(
        self: Box<Self>,
        sink: UpdateSink,
        shutdown: CancellationToken,
    ) -> Result<(), IngestionError>;
}

/// The ingestion end of the engine's bounded queue.
#[derive(Debug, Clone)]
pub struct UpdateSink {
    tx: mpsc::Sender<Update>,
    initiated: watch::Receiver<Option<i64>>,
}

impl UpdateSink {
    pub(crate) fn new(tx: mpsc::Sender<Update>, initiated: watch::Receiver<Option<i64>>) -> Self {
        Self { tx, initiated }
    }

    /// Queues an update, waiting while the queue is full.
    pub async fn send(&self, update: Update) -> Result<(), IngestionError> {
        self.tx.send(update).await.map_err(|_| IngestionError::Closed)
    }

    /// Waits until dispatch of `update_id` (and everything before it) has
    /// been initiated.
    pub async fn wait_initiated(&self, update_id: i64) -> Result<(), IngestionError> {
        let mut rx = self.initiated.clone();
        rx.wait_for(|w| w.is_some_and(|w| w >= update_id))
            .await
            .map(|_| ())
            .map_err(|_| IngestionError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
