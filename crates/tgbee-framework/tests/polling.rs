mod common;

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use common::{Log, api, message};
use parking_lot::Mutex;
use tgbee_core::{ApiResult, GetUpdates, Message, Update, UpdateFetcher};
use tgbee_framework::filter;
use tgbee_framework::{
    DispatchEngine, EngineError, FileWatermarkStore, HandlerRegistry, IngestionError,
    PollingSource, Registration, WatermarkStore,
};

/// Serves scripted batches, then holds the long poll open forever.
#[derive(Default)]
struct Script {
    batches: Mutex<VecDeque<Vec<i64>>>,
    offsets: Mutex<Vec<Option<i64>>>,
}

impl Script {
    fn new(batches: impl IntoIterator<Item = Vec<i64>>) -> std::sync::Arc<Self> {
        let script = Self::default();
        script.batches.lock().extend(batches);
        std::sync::Arc::new(script)
    }
}

#[async_trait]
impl UpdateFetcher for Script {
    async fn get_updates(&self, request: &GetUpdates) -> ApiResult<Vec<Update>> {
        self.offsets.lock().push(request.offset);
        let batch = self.batches.lock().pop_front();
        match batch {
            Some(ids) => Ok(ids.into_iter().map(|id| message(id, "hi")).collect()),
            None => std::future::pending().await,
        }
    }
}

/// A file store that dies when asked to persist one particular id.
struct CrashingStore {
    inner: FileWatermarkStore,
    crash_at: i64,
}

#[async_trait]
impl WatermarkStore for CrashingStore {
    async fn load(&self) -> io::Result<Option<i64>> {
        self.inner.load().await
    }

    async fn store(&self, update_id: i64) -> io::Result<()> {
        if update_id == self.crash_at {
            return Err(io::Error::other("process killed"));
        }
        self.inner.store(update_id).await
    }
}

fn recording_engine(log: &Log) -> DispatchEngine {
    let seen = log.clone();
    let record = move |msg: Message| {
        let seen = seen.clone();
        async move { seen.push(msg.message_id.to_string()) }
    };
    let mut registry = HandlerRegistry::new();
    registry
        .register(Registration::new(filter::text(), record).name("record"))
        .unwrap();
    DispatchEngine::builder(api().1).registry(registry).build()
}

#[tokio::test]
async fn unacknowledged_updates_are_redelivered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("offset");
    FileWatermarkStore::new(&path).store(5).await.unwrap();

    // First run: update 6 is dispatched, but the process dies before its
    // watermark is persisted.
    let log = Log::default();
    let engine = recording_engine(&log);
    let script = Script::new([vec![6, 7]]);
    let source = PollingSource::new(script.clone()).with_store(CrashingStore {
        inner: FileWatermarkStore::new(&path),
        crash_at: 6,
    });
    let err = engine.serve(Box::new(source)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Ingestion(IngestionError::Watermark(_))
    ));
    assert_eq!(*script.offsets.lock(), vec![Some(6)]);
    assert!(log.take().contains(&"6".to_string()));

    // Restart: the stored watermark is still 5, so 6 and 7 come back.
    let store = FileWatermarkStore::new(&path);
    assert_eq!(store.load().await.unwrap(), Some(5));
    let log = Log::default();
    let engine = recording_engine(&log);
    let script = Script::new([vec![6, 7]]);
    let source = PollingSource::new(script.clone()).with_store(store.clone());
    let serving = tokio::spawn({
        let engine = engine.clone();
        async move { engine.serve(Box::new(source)).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.load().await.unwrap() != Some(7) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    engine.stop().await;
    serving.await.unwrap().unwrap();

    assert_eq!(script.offsets.lock()[0], Some(6));
    let mut seen = log.take();
    seen.sort();
    assert_eq!(seen, vec!["6", "7"]);
}

#[tokio::test]
async fn stale_ids_from_the_server_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileWatermarkStore::new(dir.path().join("offset"));
    store.store(10).await.unwrap();

    let log = Log::default();
    let engine = recording_engine(&log);
    let script = Script::new([vec![9, 10, 11]]);
    let source = PollingSource::new(script.clone()).with_store(store.clone());
    let serving = tokio::spawn({
        let engine = engine.clone();
        async move { engine.serve(Box::new(source)).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.load().await.unwrap() != Some(11) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    engine.stop().await;
    serving.await.unwrap().unwrap();

    assert_eq!(log.take(), vec!["11"]);
    assert_eq!(script.offsets.lock()[0], Some(11));
}
