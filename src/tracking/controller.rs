use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{
    clock::Clock,
    db::{NewWalk, WalkRecord},
    geo::{GeoSample, PathFilter},
    log_debug,
    sampler::{GeoSampler, SamplerMessage, SamplerSubscription, SamplingFault, SamplingFaultKind},
    store::SessionStore,
    walks::WalkClient,
};

use super::{
    events::{self, WalkEvent, WalkEventKind},
    missing_canonical_kinds, TrackingNotice, TrackingSession, TrackingSnapshot, TrackingStatus,
};

const ENABLE_LOGS: bool = false;

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a user-triggered transition. Requests that make no sense in the
/// current state are ignored rather than raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored,
}

impl Transition {
    pub fn applied(self) -> bool {
        self == Transition::Applied
    }
}

/// What the stop dialog needs to ask.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StopPrompt {
    pub elapsed_seconds: u64,
    pub missing_events: Vec<WalkEventKind>,
}

#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub filter: PathFilter,
    pub tick_interval: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            filter: PathFilter::default(),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl TrackingConfig {
    pub fn new(filter: PathFilter, tick_interval: Duration) -> Self {
        Self {
            filter,
            tick_interval: tick_interval.max(MIN_TICK_INTERVAL),
        }
    }
}

pub struct ControllerDeps<W: WalkClient> {
    pub store: SessionStore,
    pub walks: Arc<W>,
    pub sampler: Arc<dyn GeoSampler>,
    pub clock: Arc<dyn Clock>,
    pub config: TrackingConfig,
    pub notices: broadcast::Sender<TrackingNotice>,
}

impl<W: WalkClient> Clone for ControllerDeps<W> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            walks: self.walks.clone(),
            sampler: self.sampler.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            notices: self.notices.clone(),
        }
    }
}

struct SamplingTask {
    subscription: SamplerSubscription,
    forwarder: JoinHandle<()>,
}

impl SamplingTask {
    fn stop(&mut self) {
        self.subscription.stop();
        self.forwarder.abort();
    }
}

struct ControllerState {
    session: TrackingSession,
    sampling: Option<SamplingTask>,
    ticker: Option<JoinHandle<()>>,
    /// Bumped on every (re)subscription; deliveries from older ones are dropped.
    epoch: u64,
    last_fault: Option<SamplingFault>,
    submitting: bool,
}

impl ControllerState {
    fn teardown(&mut self) {
        if let Some(mut sampling) = self.sampling.take() {
            sampling.stop();
        }
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot::new(self.session.clone(), self.last_fault.clone(), self.submitting)
    }
}

/// Owns the single in-progress walk for one pet. Every mutation is written
/// through to the session store while the session lock is held, so the durable
/// copy always matches the latest in-memory state.
pub struct TrackingController<W: WalkClient> {
    pet_id: Arc<str>,
    state: Arc<Mutex<ControllerState>>,
    deps: ControllerDeps<W>,
}

impl<W: WalkClient> Clone for TrackingController<W> {
    fn clone(&self) -> Self {
        Self {
            pet_id: self.pet_id.clone(),
            state: self.state.clone(),
            deps: self.deps.clone(),
        }
    }
}

impl<W: WalkClient> TrackingController<W> {
    pub fn new(pet_id: impl Into<String>, deps: ControllerDeps<W>) -> Self {
        let pet_id: String = pet_id.into();
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                session: TrackingSession::new(pet_id.clone()),
                sampling: None,
                ticker: None,
                epoch: 0,
                last_fault: None,
                submitting: false,
            })),
            pet_id: pet_id.into(),
            deps,
        }
    }

    pub fn pet_id(&self) -> &str {
        &self.pet_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingNotice> {
        self.deps.notices.subscribe()
    }

    pub async fn snapshot(&self) -> TrackingSnapshot {
        let mut guard = self.state.lock().await;
        guard.session.sync_elapsed(self.deps.clock.now());
        guard.snapshot()
    }

    pub async fn session(&self) -> TrackingSession {
        self.snapshot().await.session
    }

    /// Restores a walk left in the session store by an earlier run.
    pub async fn resume(&self) -> Result<Transition> {
        let mut guard = self.state.lock().await;
        if guard.session.is_active() {
            return Ok(Transition::Ignored);
        }

        let Some(mut session) = self.deps.store.load(&self.pet_id).await? else {
            return Ok(Transition::Ignored);
        };

        // Tracking recomputes from started_at, so outage time counts; a
        // confirming session keeps its frozen value.
        session.sync_elapsed(self.deps.clock.now());
        guard.session = session;
        guard.last_fault = None;

        if guard.session.status == TrackingStatus::Tracking {
            self.activate(&mut guard);
        }

        info!(
            "Resumed walk for pet {} in {} ({} points, {:.1} m, {}s)",
            self.pet_id,
            guard.session.status.as_str(),
            guard.session.path.len(),
            guard.session.total_distance_meters,
            guard.session.elapsed_seconds
        );
        self.emit_state(&guard);
        Ok(Transition::Applied)
    }

    pub async fn start_tracking(&self) -> Result<Transition> {
        let mut guard = self.state.lock().await;
        if guard.session.status != TrackingStatus::Idle {
            warn!(
                "Ignoring start for pet {}: walk already {}",
                self.pet_id,
                guard.session.status.as_str()
            );
            return Ok(Transition::Ignored);
        }

        guard.session.begin(self.deps.clock.now());
        guard.last_fault = None;
        self.mirror(&guard.session).await;
        self.activate(&mut guard);

        info!("Started walk for pet {}", self.pet_id);
        self.emit_state(&guard);
        Ok(Transition::Applied)
    }

    /// Feeds one fix through the path filter. Returns the distance added when
    /// the fix extended the path.
    pub async fn ingest_sample(&self, sample: GeoSample) -> Option<f64> {
        self.apply_sample(sample, None).await
    }

    pub async fn report_fault(&self, fault: SamplingFault) {
        self.apply_fault(fault, None).await
    }

    pub async fn log_event(&self, kind: WalkEventKind) -> Option<WalkEvent> {
        let mut guard = self.state.lock().await;
        let now = self.deps.clock.now();
        let Some(event) = events::log_event(&mut guard.session, kind, now) else {
            warn!(
                "Ignoring {} event for pet {}: walk is {}",
                kind.as_str(),
                self.pet_id,
                guard.session.status.as_str()
            );
            return None;
        };

        guard.session.sync_elapsed(now);
        self.mirror(&guard.session).await;
        self.emit_state(&guard);
        Some(event)
    }

    pub async fn stop_tracking(&self) -> Option<StopPrompt> {
        let mut guard = self.state.lock().await;
        if guard.session.status != TrackingStatus::Tracking {
            warn!(
                "Ignoring stop for pet {}: walk is {}",
                self.pet_id,
                guard.session.status.as_str()
            );
            return None;
        }

        guard.teardown();
        guard.session.freeze(self.deps.clock.now());
        self.mirror(&guard.session).await;

        let prompt = StopPrompt {
            elapsed_seconds: guard.session.elapsed_seconds,
            missing_events: missing_canonical_kinds(&guard.session.events),
        };
        info!(
            "Stopped walk for pet {} at {}s, awaiting confirmation",
            self.pet_id, prompt.elapsed_seconds
        );
        self.emit_state(&guard);
        Some(prompt)
    }

    /// Records a canonical event the user confirms in the stop dialog.
    pub async fn confirm_event(&self, kind: WalkEventKind) -> Option<WalkEvent> {
        let mut guard = self.state.lock().await;
        if guard.submitting {
            return None;
        }
        let event = events::confirm_missing_event(&mut guard.session, kind, self.deps.clock.now())?;
        self.mirror(&guard.session).await;
        self.emit_state(&guard);
        Some(event)
    }

    /// Dismisses the stop dialog and keeps walking.
    pub async fn cancel_confirm(&self) -> Transition {
        let mut guard = self.state.lock().await;
        if guard.session.status != TrackingStatus::ConfirmingStop || guard.submitting {
            return Transition::Ignored;
        }

        guard.session.resume(self.deps.clock.now());
        self.mirror(&guard.session).await;
        self.activate(&mut guard);

        info!("Resumed tracking for pet {} after cancelled stop", self.pet_id);
        self.emit_state(&guard);
        Transition::Applied
    }

    /// Hands the finished walk to the walk client. The session is only cleared
    /// once the client acknowledges; on failure it stays in `ConfirmingStop`
    /// so the save can be retried.
    pub async fn confirm_save(&self) -> Result<Option<WalkRecord>> {
        let walk = {
            let mut guard = self.state.lock().await;
            if guard.session.status != TrackingStatus::ConfirmingStop || guard.submitting {
                warn!(
                    "Ignoring save for pet {}: walk is {}{}",
                    self.pet_id,
                    guard.session.status.as_str(),
                    if guard.submitting { " (submission in flight)" } else { "" }
                );
                return Ok(None);
            }

            let session = &guard.session;
            let start_time = session
                .started_at
                .ok_or_else(|| anyhow!("walk for pet {} has no start time", self.pet_id))?;
            let walk = NewWalk {
                pet_id: self.pet_id.to_string(),
                start_time,
                end_time: self.deps.clock.now().max(start_time),
                distance_meters: session.distance_meters_rounded(),
                path: session.path.clone(),
                events: session.events.clone(),
            };

            guard.submitting = true;
            self.emit_state(&guard);
            walk
        };

        // Detached so `submitting` is always settled, even if the caller
        // stops waiting.
        let controller = self.clone();
        match tokio::spawn(async move { controller.submit(walk).await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let mut guard = self.state.lock().await;
                guard.submitting = false;
                self.emit_state(&guard);
                Err(anyhow!("walk submission for pet {} aborted: {err}", self.pet_id))
            }
        }
    }

    async fn submit(&self, walk: NewWalk) -> Result<Option<WalkRecord>> {
        let result = self.deps.walks.create(walk).await;

        let mut guard = self.state.lock().await;
        guard.submitting = false;

        match result {
            Ok(record) => {
                guard.teardown();
                guard.session.reset();
                guard.last_fault = None;
                if let Err(err) = self.deps.store.clear(&self.pet_id).await {
                    error!("Walk {} saved but durable session not cleared: {err:#}", record.id);
                }

                info!(
                    "Saved walk {} for pet {} ({} m, {} events)",
                    record.id,
                    self.pet_id,
                    record.distance_meters,
                    record.events.len()
                );
                self.emit_state(&guard);
                let _ = self.deps.notices.send(TrackingNotice::WalkSaved {
                    pet_id: self.pet_id.to_string(),
                    walk: record.clone(),
                });
                Ok(Some(record))
            }
            Err(err) => {
                error!("Failed to submit walk for pet {}: {err:#}", self.pet_id);
                let _ = self.deps.notices.send(TrackingNotice::SubmissionFailed {
                    pet_id: self.pet_id.to_string(),
                    message: format!("{err:#}"),
                });
                self.emit_state(&guard);
                Err(err.context("failed to submit walk"))
            }
        }
    }

    /// Abandons the walk from the stop dialog without saving it.
    pub async fn discard_walk(&self) -> Transition {
        let mut guard = self.state.lock().await;
        if guard.session.status != TrackingStatus::ConfirmingStop || guard.submitting {
            return Transition::Ignored;
        }

        guard.teardown();
        guard.session.reset();
        guard.last_fault = None;
        if let Err(err) = self.deps.store.clear(&self.pet_id).await {
            error!("Failed to clear durable session for pet {}: {err:#}", self.pet_id);
        }

        info!("Discarded walk for pet {}", self.pet_id);
        self.emit_state(&guard);
        Transition::Applied
    }

    /// Releases the sampler and clock without touching the session. Safe to
    /// call any number of times.
    pub async fn shutdown(&self) {
        self.state.lock().await.teardown();
    }

    async fn apply_sample(&self, sample: GeoSample, epoch: Option<u64>) -> Option<f64> {
        let mut guard = self.state.lock().await;
        if epoch.is_some_and(|epoch| epoch != guard.epoch) {
            return None;
        }

        let filter = self.deps.config.filter;
        let Some(delta) = guard.session.apply_sample(&filter, &sample) else {
            log_debug!(
                "Dropped fix {:.6},{:.6} for pet {}",
                sample.lat,
                sample.lon,
                self.pet_id
            );
            return None;
        };
        guard.last_fault = None;
        guard.session.sync_elapsed(self.deps.clock.now());
        self.mirror(&guard.session).await;
        self.emit_state(&guard);
        Some(delta)
    }

    async fn apply_fault(&self, fault: SamplingFault, epoch: Option<u64>) {
        let mut guard = self.state.lock().await;
        if epoch.is_some_and(|epoch| epoch != guard.epoch)
            || guard.session.status != TrackingStatus::Tracking
        {
            return;
        }
        self.record_fault(&mut guard, fault);
    }

    fn record_fault(&self, state: &mut ControllerState, fault: SamplingFault) {
        warn!(
            "Location fault for pet {} ({:?}): {}",
            self.pet_id, fault.kind, fault.message
        );
        state.last_fault = Some(fault.clone());
        let _ = self.deps.notices.send(TrackingNotice::SamplingFault {
            pet_id: self.pet_id.to_string(),
            fault,
        });
    }

    async fn tick(&self, epoch: u64) -> bool {
        let mut guard = self.state.lock().await;
        if epoch != guard.epoch || guard.session.status != TrackingStatus::Tracking {
            return false;
        }

        guard.session.sync_elapsed(self.deps.clock.now());
        let _ = self.deps.notices.send(TrackingNotice::Tick {
            pet_id: self.pet_id.to_string(),
            elapsed_seconds: guard.session.elapsed_seconds,
            elapsed_display: super::format::format_elapsed(guard.session.elapsed_seconds),
        });
        true
    }

    /// Subscribes to the sampler and starts the elapsed-time clock for a
    /// session that just entered `Tracking`.
    fn activate(&self, state: &mut ControllerState) {
        state.teardown();
        state.epoch = state.epoch.wrapping_add(1);
        let epoch = state.epoch;

        match self.subscribe_sampler(epoch) {
            Ok(sampling) => state.sampling = Some(sampling),
            Err(err) => self.record_fault(
                state,
                SamplingFault::new(SamplingFaultKind::Unavailable, format!("{err:#}")),
            ),
        }

        let controller = self.clone();
        let tick_interval = self.deps.config.tick_interval;
        state.ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !controller.tick(epoch).await {
                    break;
                }
            }
        }));
    }

    fn subscribe_sampler(&self, epoch: u64) -> Result<SamplingTask> {
        let (sink, mut receiver) = mpsc::unbounded_channel();
        let subscription = self.deps.sampler.start(sink)?;

        let controller = self.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    SamplerMessage::Sample(sample) => {
                        controller.apply_sample(sample, Some(epoch)).await;
                    }
                    SamplerMessage::Fault(fault) => {
                        controller.apply_fault(fault, Some(epoch)).await;
                    }
                }
            }
        });

        Ok(SamplingTask {
            subscription,
            forwarder,
        })
    }

    async fn mirror(&self, session: &TrackingSession) {
        if let Err(err) = self.deps.store.save(&self.pet_id, session).await {
            error!("Failed to mirror walk for pet {}: {err:#}", self.pet_id);
        }
    }

    fn emit_state(&self, state: &ControllerState) {
        let _ = self.deps.notices.send(TrackingNotice::StateChanged {
            snapshot: state.snapshot(),
        });
    }
}
