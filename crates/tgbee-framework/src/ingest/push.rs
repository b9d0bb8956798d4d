use std::sync::Arc;

use async_trait::async_trait;
use tgbee_core::Update;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{UpdateSink, UpdateSource};
use crate::error::IngestionError;

/// What happened to a pushed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushReceipt {
    /// Queued for dispatch.
    Accepted,
    /// Same id as the last accepted update; dropped.
    Duplicate,
}

/// Push-mode ingestion.
///
/// The external receiver owns a [`PushHandle`]; the source only forwards
/// what the handle accepted.
pub struct PushSource {
    rx: mpsc::Receiver<Update>,
}

/// Sending half of a [`PushSource`]. Clones share the ordering state.
#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: mpsc::Sender<Update>,
    last: Arc<Mutex<Option<i64>>>,
}

impl PushSource {
    /// Creates a source whose handle buffers up to `capacity` updates before
    /// the engine starts pulling.
    pub fn new(capacity: usize) -> (Self, PushHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = PushHandle {
            tx,
            last: Arc::new(Mutex::new(None)),
        };
        (Self { rx }, handle)
    }
}

impl PushHandle {
    /// Hands an already-decoded update over for dispatch.
    ///
    /// Concurrent pushes are serialized, so acceptance order is queue order.
    pub async fn push(&self, update: Update) -> Result<PushReceipt, IngestionError> {
        let mut last = self.last.lock().await;
        match *last {
            Some(l) if update.update_id == l => {
                debug!(update_id = l, "duplicate push ignored");
                return Ok(PushReceipt::Duplicate);
            }
            Some(l) if update.update_id < l => {
                return Err(IngestionError::OutOfOrder {
                    update_id: update.update_id,
                    last: l,
                });
            }
            _ => {}
        }
        let update_id = update.update_id;
        self.tx
            .send(update)
            .await
            .map_err(|_| IngestionError::Closed)?;
        *last = Some(update_id);
        Ok(PushReceipt::Accepted)
    }

    /// Last accepted update id.
    pub async fn last_accepted(&self) -> Option<i64> {
        *self.last.lock().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PushSource {
    /// Forwards one accepted update. If the engine is gone, the update and
    /// everything still buffered behind it are reported as lost.
    async fn forward(&mut self, sink: &UpdateSink, update: Update) -> Result<(), IngestionError> {
        let update_id = update.update_id;
        if sink.send(update).await.is_ok() {
            return Ok(());
        }
        self.rx.close();
        let mut lost = vec![update_id];
        while let Some(update) = self.rx.recv().await {
            lost.push(update.update_id);
        }
        warn!(update_ids = ?lost, "dispatch queue closed, accepted updates were not dispatched");
        Err(IngestionError::Closed)
    }
}

#[async_trait]
impl UpdateSource for PushSource {
    async fn run(
        mut self: Box<Self>,
        sink: UpdateSink,
        shutdown: CancellationToken,
    ) -> Result<(), IngestionError> {
        info!("push ingestion started");
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.rx.recv() => next,
            };
            match next {
                Some(update) => self.forward(&sink, update).await?,
                None => break,
            }
        }

        // New pushes fail from here on; already accepted ones still go out.
        self.rx.close();
        let mut flushed = 0usize;
        while let Some(update) = self.rx.recv().await {
            self.forward(&sink, update).await?;
            flushed += 1;
        }
        info!(flushed, "push ingestion stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn update(id: i64) -> Update {
        serde_json::from_value(json!({
            "update_id": id,
            "callback_query": {"id": "q", "from": {"id": 1, "first_name": "A"}, "chat_instance": "c"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_push_ordering() {
        let (mut source, handle) = PushSource::new(8);
        assert_eq!(handle.push(update(10)).await.unwrap(), PushReceipt::Accepted);
        assert_eq!(handle.push(update(10)).await.unwrap(), PushReceipt::Duplicate);
        assert!(matches!(
            handle.push(update(9)).await,
            Err(IngestionError::OutOfOrder { update_id: 9, last: 10 })
        ));
        assert_eq!(handle.push(update(12)).await.unwrap(), PushReceipt::Accepted);
        assert_eq!(handle.last_accepted().await, Some(12));

        assert_eq!(source.rx.recv().await.unwrap().update_id, 10);
        assert_eq!(source.rx.recv().await.unwrap().update_id, 12);

        drop(source);
        assert!(matches!(
            handle.push(update(13)).await,
            Err(IngestionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_full_queue_holds_the_pusher() {
        use tokio_test::{assert_pending, assert_ready, task};

        let (mut source, handle) = PushSource::new(1);
        assert_eq!(handle.push(update(1)).await.unwrap(), PushReceipt::Accepted);

        let mut blocked = task::spawn(handle.push(update(2)));
        assert_pending!(blocked.poll());

        assert_eq!(source.rx.recv().await.unwrap().update_id, 1);
        assert!(blocked.is_woken());
        assert_eq!(assert_ready!(blocked.poll()).unwrap(), PushReceipt::Accepted);
        assert_eq!(source.rx.recv().await.unwrap().update_id, 2);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_accepted_updates() {
        let (source, handle) = PushSource::new(8);
        for id in 1..=3 {
            handle.push(update(id)).await.unwrap();
        }

        let (tx, mut rx) = mpsc::channel(8);
        let (_initiated, watermark) = tokio::sync::watch::channel(None);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        Box::new(source)
            .run(UpdateSink::new(tx, watermark), shutdown)
            .await
            .unwrap();

        let mut forwarded = Vec::new();
        while let Some(update) = rx.recv().await {
            forwarded.push(update.update_id);
        }
        assert_eq!(forwarded, vec![1, 2, 3]);
        assert!(matches!(
            handle.push(update(4)).await,
            Err(IngestionError::Closed)
        ));
    }
}
