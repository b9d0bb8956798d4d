//! The dispatch engine.
//!
//! [`DispatchEngine`] owns the [`HandlerRegistry`] for its whole lifetime and
//! turns each ingested [`Update`] into handler invocations:
//!
//! 1. The update's variant selects a snapshot of registry entries.
//! 2. Groups are walked in the configured [`GroupOrder`]; within a group the
//!    first entry whose filter matches is selected and the rest of the group
//!    is skipped.
//! 3. Selected handlers are scheduled on a [`TaskTracker`], each holding one
//!    of `max_in_flight` permits. Acquiring permits is where ingestion feels
//!    backpressure.
//! 4. Failures, panics and grace-period cancellations are caught per handler,
//!    reported to the error observer (or logged) and counted in the
//!    [`DispatchOutcome`].
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──serve()──▶ Running ──stop()──▶ Draining ──grace period──▶ Stopped
//! ```
//!
//! Updates are initiated strictly in arrival order; completion order is
//! unconstrained.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tgbee_core::{BoxedApi, Update, UpdateType};
use tokio::sync::{OwnedSemaphorePermit, RwLock as GroupGate, Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tracing::{Instrument, debug, debug_span, error, info, trace, warn};

use crate::context::{HandlerContext, UpdateContext};
use crate::error::{EngineError, ExecutionFailure, HandlerExecutionError};
use crate::ingest::{UpdateSink, UpdateSource};
use crate::registry::{
    EntriesFor, GroupId, GroupOrder, HandlerEntry, HandlerHandle, HandlerRegistry, Registration,
};

// ============================================================================
// State and configuration
// ============================================================================

/// Lifecycle state of a [`DispatchEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Registry may be changed freely; nothing is being ingested.
    Idle,
    /// An ingestion source is producing updates.
    Running,
    /// Stop requested: the source stops, queued updates and in-flight
    /// handlers may still finish.
    Draining,
    /// Terminal.
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

/// How the matched handlers of one update are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Every matched handler is its own task.
    #[default]
    Concurrent,
    /// One task runs the matched handlers in group order and honours
    /// [`HandlerContext::stop_propagation`].
    Sequential,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub isolation: Isolation,
    /// Handler tasks allowed to run at once, across all updates.
    pub max_in_flight: usize,
    /// Capacity of the queue between ingestion and dispatch.
    pub queue_capacity: usize,
    /// How long [`DispatchEngine::stop`] waits before cancelling handlers.
    pub grace_period: Duration,
    pub group_order: GroupOrder,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            isolation: Isolation::Concurrent,
            max_in_flight: 64,
            queue_capacity: 256,
            grace_period: Duration::from_secs(5),
            group_order: GroupOrder::Ascending,
        }
    }
}

pub type ErrorObserver = Arc<dyn Fn(&HandlerExecutionError) + Send + Sync>;
pub type OutcomeObserver = Arc<dyn Fn(&DispatchOutcome) + Send + Sync>;

// ============================================================================
// DispatchOutcome
// ============================================================================

/// What happened to one update.
///
/// Every update the engine accepts yields exactly one outcome, including
/// updates that matched nothing.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub update_id: i64,
    pub update_type: UpdateType,
    /// Handlers invoked.
    pub matched: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
    /// Handlers cancelled at the end of the drain grace period.
    pub cancelled: usize,
    /// A group skipped entries after its first match, or a sequential
    /// dispatch skipped groups after `stop_propagation`.
    pub stopped_early: bool,
    pub errors: Vec<HandlerExecutionError>,
}

impl DispatchOutcome {
    fn new(update_id: i64, update_type: UpdateType) -> Self {
        Self {
            update_id,
            update_type,
            matched: 0,
            failed: 0,
            cancelled: 0,
            stopped_early: false,
            errors: Vec::new(),
        }
    }

    /// Whether every invoked handler succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    fn absorb(&mut self, report: UnitReport) {
        self.matched += report.invoked;
        self.stopped_early |= report.halted;
        for err in report.errors {
            match err.failure {
                ExecutionFailure::Cancelled => self.cancelled += 1,
                _ => self.failed += 1,
            }
            self.errors.push(err);
        }
    }
}

/// Result of one scheduled unit: a single handler, or a sequential chain.
#[derive(Default)]
struct UnitReport {
    invoked: usize,
    errors: Vec<HandlerExecutionError>,
    halted: bool,
}

/// An update whose handlers have been scheduled.
#[derive(Debug)]
pub struct PendingDispatch {
    update_id: i64,
    update_type: UpdateType,
    rx: oneshot::Receiver<DispatchOutcome>,
}

impl PendingDispatch {
    pub fn update_id(&self) -> i64 {
        self.update_id
    }

    /// Waits for every scheduled handler of the update.
    pub async fn outcome(self) -> DispatchOutcome {
        let Self {
            update_id,
            update_type,
            rx,
        } = self;
        rx.await
            .unwrap_or_else(|_| DispatchOutcome::new(update_id, update_type))
    }
}

// ============================================================================
// DispatchEngine
// ============================================================================

struct EngineInner {
    api: BoxedApi,
    registry: RwLock<HandlerRegistry>,
    gates: Mutex<HashMap<GroupId, Arc<GroupGate<()>>>>,
    config: DispatchConfig,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Stops the ingestion source.
    shutdown: CancellationToken,
    /// Cancels handlers still running after the grace period.
    cancel: CancellationToken,
    state: watch::Sender<EngineState>,
    initiated: watch::Sender<Option<i64>>,
    on_error: Option<ErrorObserver>,
    on_outcome: Option<OutcomeObserver>,
}

/// Routes updates to the handlers of its registry.
///
/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`DispatchEngine`].
pub struct DispatchEngineBuilder {
    api: BoxedApi,
    registry: HandlerRegistry,
    config: DispatchConfig,
    on_error: Option<ErrorObserver>,
    on_outcome: Option<OutcomeObserver>,
}

impl DispatchEngineBuilder {
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Receives every handler failure. Without an observer failures are
    /// logged at error level.
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&HandlerExecutionError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    /// Receives the outcome of every update.
    pub fn on_outcome<F>(mut self, observer: F) -> Self
    where
        F: Fn(&DispatchOutcome) + Send + Sync + 'static,
    {
        self.on_outcome = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> DispatchEngine {
        let Self {
            api,
            mut registry,
            config,
            on_error,
            on_outcome,
        } = self;
        registry.set_group_order(config.group_order);
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        DispatchEngine {
            inner: Arc::new(EngineInner {
                api,
                registry: RwLock::new(registry),
                gates: Mutex::new(HashMap::new()),
                config,
                permits,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                cancel: CancellationToken::new(),
                state: watch::Sender::new(EngineState::Idle),
                initiated: watch::Sender::new(None),
                on_error,
                on_outcome,
            }),
        }
    }
}

impl DispatchEngine {
    pub fn builder(api: BoxedApi) -> DispatchEngineBuilder {
        DispatchEngineBuilder {
            api,
            registry: HandlerRegistry::new(),
            config: DispatchConfig::default(),
            on_error: None,
            on_outcome: None,
        }
    }

    pub fn new(api: BoxedApi, registry: HandlerRegistry) -> Self {
        Self::builder(api).registry(registry).build()
    }

    pub fn api(&self) -> &BoxedApi {
        &self.inner.api
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    /// Highest update id whose dispatch has been initiated by [`serve`](Self::serve).
    pub fn initiated_watermark(&self) -> Option<i64> {
        *self.inner.initiated.borrow()
    }

    // ─── Registry access ────────────────────────────────────────────────────

    fn ensure_idle(&self) -> Result<(), EngineError> {
        match self.state() {
            EngineState::Idle => Ok(()),
            other => Err(EngineError::NotIdle(other)),
        }
    }

    /// Registers a handler. Only allowed while idle.
    pub fn register(&self, registration: Registration) -> Result<HandlerHandle, EngineError> {
        self.ensure_idle()?;
        Ok(self.inner.registry.write().register(registration)?)
    }

    /// Runs `f` with exclusive registry access. Only allowed while idle.
    pub fn with_registry<R>(
        &self,
        f: impl FnOnce(&mut HandlerRegistry) -> R,
    ) -> Result<R, EngineError> {
        self.ensure_idle()?;
        Ok(f(&mut self.inner.registry.write()))
    }

    pub fn entries_for(&self, update_type: UpdateType) -> EntriesFor {
        self.inner.registry.read().entries_for(update_type)
    }

    pub fn handler_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    // ─── Hot reload ─────────────────────────────────────────────────────────

    /// Removes a group in any state, after its in-flight invocations finish.
    pub async fn clear_group(&self, group: GroupId) -> Vec<HandlerHandle> {
        let gate = self.inner.gate(group);
        let _exclusive = gate.write().await;
        self.inner.registry.write().clear_group(group)
    }

    /// Removes one entry in any state, after in-flight invocations of its
    /// group finish.
    pub async fn unregister(&self, handle: HandlerHandle) -> bool {
        let Some(group) = self.inner.registry.read().get(handle).map(|e| e.group()) else {
            return false;
        };
        let gate = self.inner.gate(group);
        let _exclusive = gate.write().await;
        self.inner.registry.write().unregister(handle)
    }

    /// Registers in any state, serialized against the target group.
    pub async fn register_hot(
        &self,
        registration: Registration,
    ) -> Result<HandlerHandle, EngineError> {
        let gate = self.inner.gate(registration.group_id());
        let _exclusive = gate.write().await;
        Ok(self.inner.registry.write().register(registration)?)
    }

    // ─── Dispatch ───────────────────────────────────────────────────────────

    /// Matches the update and schedules its handlers.
    ///
    /// Returns once every matched handler has been started (or queued for
    /// a permit and started); the handlers themselves keep running.
    pub async fn initiate(&self, update: Update) -> Result<PendingDispatch, EngineError> {
        match self.state() {
            EngineState::Idle | EngineState::Running => Ok(self.inner.initiate(update).await),
            EngineState::Draining | EngineState::Stopped => Err(EngineError::Stopped),
        }
    }

    /// Initiates the update and waits for its outcome.
    pub async fn dispatch(&self, update: Update) -> Result<DispatchOutcome, EngineError> {
        Ok(self.initiate(update).await?.outcome().await)
    }

    /// Runs `source` until it finishes or [`stop`](Self::stop) is called,
    /// then drains.
    ///
    /// Updates pass through a bounded queue; when it is full the source
    /// waits. Dispatch of each update is initiated in queue order and the
    /// initiated watermark is published to the source's [`UpdateSink`].
    ///
    /// A stop request only stops the source: everything it already queued
    /// is still dispatched, and the drain does not finish before the queue
    /// is empty. Once the grace period elapses the queue stops accepting,
    /// and what is left in it is initiated against cancelled handlers.
    pub async fn serve(&self, source: Box<dyn UpdateSource>) -> Result<(), EngineError> {
        // Held until the queue is empty, so a concurrent `stop` cannot
        // finish draining before the last queued update was initiated.
        let serving = self.inner.tracker.token();
        let mut started = false;
        self.inner.state.send_if_modified(|state| {
            if *state == EngineState::Idle {
                *state = EngineState::Running;
                started = true;
            }
            started
        });
        if !started {
            return Err(match self.state() {
                EngineState::Running => EngineError::AlreadyStarted,
                _ => EngineError::Stopped,
            });
        }
        info!(
            handlers = self.handler_count(),
            isolation = ?self.inner.config.isolation,
            max_in_flight = self.inner.config.max_in_flight,
            "dispatch engine running"
        );

        let (tx, mut rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let sink = UpdateSink::new(tx, self.inner.initiated.subscribe());
        let shutdown = self.inner.shutdown.clone();
        let cancel = self.inner.cancel.clone();
        let producer: JoinHandle<_> = tokio::spawn(source.run(sink, shutdown.child_token()));

        let mut stopping = false;
        let mut closed = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled(), if !stopping => {
                    debug!(queued = rx.len(), "stop requested, dispatching queued updates");
                    stopping = true;
                    continue;
                }
                _ = cancel.cancelled(), if !closed => {
                    rx.close();
                    closed = true;
                    continue;
                }
                next = rx.recv() => next,
            };
            let Some(update) = next else { break };
            let update_id = update.update_id;
            // The outcome is delivered to the observer; nobody awaits it here.
            let _pending = self.inner.initiate(update).await;
            self.inner.initiated.send_replace(Some(update_id));
        }
        drop(rx);
        drop(serving);

        let produced = producer.await;
        self.stop().await;
        match produced {
            Ok(result) => result.map_err(EngineError::from),
            Err(join) => {
                error!(error = %join, "ingestion source task failed");
                Err(EngineError::Stopped)
            }
        }
    }

    /// Stops ingestion and drains in-flight handlers.
    ///
    /// Handlers still running after the grace period are cancelled. Calling
    /// this more than once waits for the first call to finish.
    pub async fn stop(&self) {
        let mut first = false;
        self.inner.state.send_if_modified(|state| match state {
            EngineState::Idle | EngineState::Running => {
                *state = EngineState::Draining;
                first = true;
                true
            }
            _ => false,
        });
        if !first {
            self.wait_stopped().await;
            return;
        }

        info!("dispatch engine draining");
        let inner = &self.inner;
        inner.shutdown.cancel();
        inner.tracker.close();
        let grace = inner.config.grace_period;
        if tokio::time::timeout(grace, inner.tracker.wait()).await.is_err() {
            warn!(
                in_flight = inner.tracker.len(),
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed, cancelling handlers"
            );
            inner.cancel.cancel();
            inner.tracker.wait().await;
        }
        inner.state.send_replace(EngineState::Stopped);
        info!("dispatch engine stopped");
    }

    pub async fn wait_stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| *s == EngineState::Stopped).await;
    }

    /// A token cancelled when the engine starts draining.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("state", &self.state())
            .field("handlers", &self.handler_count())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Per-update algorithm
// ============================================================================

/// First matching entry of each group, and whether any group had entries
/// left unexamined after its match.
fn select_matches(entries: &EntriesFor, update: &Update) -> (Vec<Arc<HandlerEntry>>, bool) {
    let mut matched = Vec::new();
    let mut skipped = false;
    for (group, list) in entries.groups() {
        if let Some(pos) = list.iter().position(|e| e.filter().evaluate(update)) {
            trace!(group, handler = list[pos].name(), "matched");
            matched.push(Arc::clone(&list[pos]));
            skipped |= pos + 1 < list.len();
        }
    }
    (matched, skipped)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl EngineInner {
    fn gate(&self, group: GroupId) -> Arc<GroupGate<()>> {
        Arc::clone(self.gates.lock().entry(group).or_default())
    }

    async fn permit(&self) -> Option<OwnedSemaphorePermit> {
        // The semaphore is never closed.
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }

    async fn initiate(self: &Arc<Self>, update: Update) -> PendingDispatch {
        let update = Arc::new(update);
        let update_id = update.update_id;
        let update_type = update.update_type();
        let span = debug_span!("dispatch", update_id, update_type = %update_type);

        let entries = self.registry.read().entries_for(update_type);
        let (matched, skipped) = select_matches(&entries, &update);
        let (tx, rx) = oneshot::channel();

        if matched.is_empty() {
            span.in_scope(|| debug!("no handler matched"));
            let outcome = DispatchOutcome::new(update_id, update_type);
            self.report_outcome(&outcome);
            let _ = tx.send(outcome);
            return PendingDispatch {
                update_id,
                update_type,
                rx,
            };
        }

        let shared = Arc::new(UpdateContext::new(update, Arc::clone(&self.api)));
        let mut units: Vec<JoinHandle<UnitReport>> = Vec::new();
        match self.config.isolation {
            Isolation::Concurrent => {
                for entry in matched {
                    let permit = self.permit().await;
                    let gate = self.gate(entry.group()).read_owned().await;
                    let engine = Arc::clone(self);
                    let shared = Arc::clone(&shared);
                    units.push(self.tracker.spawn(
                        async move {
                            let _permit = permit;
                            let _gate = gate;
                            let mut report = UnitReport::default();
                            engine.run_entry(&shared, &entry, &mut report).await;
                            report
                        }
                        .instrument(span.clone()),
                    ));
                }
            }
            Isolation::Sequential => {
                let permit = self.permit().await;
                let engine = Arc::clone(self);
                units.push(self.tracker.spawn(
                    async move {
                        let _permit = permit;
                        engine.run_sequence(&shared, &matched).await
                    }
                    .instrument(span.clone()),
                ));
            }
        }

        let engine = Arc::clone(self);
        self.tracker.spawn(
            async move {
                let mut outcome = DispatchOutcome::new(update_id, update_type);
                outcome.stopped_early = skipped;
                for unit in units {
                    match unit.await {
                        Ok(report) => outcome.absorb(report),
                        Err(join) => {
                            warn!(error = %join, "handler task did not complete");
                            outcome.cancelled += 1;
                        }
                    }
                }
                engine.report_outcome(&outcome);
                let _ = tx.send(outcome);
            }
            .instrument(span),
        );

        PendingDispatch {
            update_id,
            update_type,
            rx,
        }
    }

    async fn run_sequence(
        &self,
        shared: &Arc<UpdateContext>,
        entries: &[Arc<HandlerEntry>],
    ) -> UnitReport {
        let mut report = UnitReport::default();
        for (i, entry) in entries.iter().enumerate() {
            if !shared.is_propagating() {
                debug!(skipped = entries.len() - i, "propagation stopped");
                report.halted = true;
                break;
            }
            let gate = self.gate(entry.group());
            let _gate = gate.read().await;
            self.run_entry(shared, entry, &mut report).await;
        }
        report
    }

    /// Invokes one entry. The caller holds the entry's group gate.
    async fn run_entry(
        &self,
        shared: &Arc<UpdateContext>,
        entry: &HandlerEntry,
        report: &mut UnitReport,
    ) {
        if !self.registry.read().contains(entry.handle()) {
            debug!(handler = entry.name(), "entry removed before invocation");
            return;
        }
        report.invoked += 1;

        let ctx = Arc::new(HandlerContext::new(
            Arc::clone(shared),
            entry.name_arc(),
            entry.group(),
        ));
        let call = AssertUnwindSafe(entry.service().oneshot(ctx)).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionFailure::Cancelled),
            res = call => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ExecutionFailure::Failed(e)),
                Err(panic) => Err(ExecutionFailure::Panicked(panic_message(panic))),
            },
        };

        match result {
            Ok(()) => trace!(handler = entry.name(), "handler finished"),
            Err(failure) => {
                let err = HandlerExecutionError {
                    update_id: shared.update().update_id,
                    handler: entry.name_arc(),
                    group: entry.group(),
                    failure,
                };
                match &self.on_error {
                    Some(observer) => observer(&err),
                    None => error!(
                        update_id = err.update_id,
                        handler = %err.handler,
                        group = err.group,
                        "{}", err.failure
                    ),
                }
                report.errors.push(err);
            }
        }
    }

    fn report_outcome(&self, outcome: &DispatchOutcome) {
        debug!(
            matched = outcome.matched,
            failed = outcome.failed,
            cancelled = outcome.cancelled,
            stopped_early = outcome.stopped_early,
            "dispatch finished"
        );
        if let Some(observer) = &self.on_outcome {
            observer(outcome);
        }
    }
}
