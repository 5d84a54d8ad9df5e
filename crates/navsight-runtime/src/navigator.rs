//! [`Navigator`] – the pipeline orchestrator.
//!
//! Owns one [`PipelineContext`] and eight long-lived Tokio workers:
//!
//! | Worker | Pace | Job |
//! |---|---|---|
//! | `vision` | camera fps | pull detection batches into the detection queue |
//! | `ranging` | ranging rate | pull ultrasonic readings into the ranging queue |
//! | `fusion` | queue-driven | fuse batches and readings into the occupancy model |
//! | `decision` | `decision_hz` | alert policy, announcement gate, state machine |
//! | `guidance` | `interval_ms` | guidance planner while an alert is active |
//! | `notification` | queue-driven | deliver queued alerts to the sink in priority order |
//! | `telemetry` | `telemetry_interval_s` | publish [`TelemetryData`] on the bus |
//! | `health` | `health_interval_s` | watchdog, queue, latency and sensor checks |
//!
//! A worker iteration that fails is logged, published as a
//! [`EventPayload::WorkerFault`] and retried after a short back-off.  Each
//! worker also runs under a supervisor: a panic anywhere in its body
//! (collaborator calls included) is caught, reported the same way and the
//! worker restarted.  Neither takes the pipeline down.
//!
//! # Example
//!
//! ```rust,no_run
//! use navsight_hal::sim::{approaching_pedestrian, RecordingSink};
//! use navsight_runtime::{Navigator, NavigatorConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), navsight_types::NavError> {
//! let (camera, ranging) = approaching_pedestrian(Duration::from_millis(100));
//! let mut nav = Navigator::new(
//!     NavigatorConfig::default(),
//!     Box::new(camera),
//!     Box::new(ranging),
//!     Box::new(RecordingSink::new("speaker")),
//! )?;
//! nav.start().await?;
//! tokio::time::sleep(Duration::from_secs(5)).await;
//! nav.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use navsight_hal::{AlertSink, DetectionSource, RangingSource};
use navsight_kernel::{
    AlertPolicy, AnnouncementGate, GateVerdict, GuidancePlanner, StateMachine, Watchdog,
};
use navsight_middleware::{AlertQueue, EventBus, FreshQueue, PushOutcome};
use navsight_perception::{DetectionFuser, OccupancyModel, OccupancySnapshot};
use navsight_types::{
    Alert, AlertOrigin, AlertPriority, Decision, Detection, Event, EventPayload, NavError,
    NavState, QueueDepths, RangingReading, Side, StateTransition, TelemetryData,
};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use crate::config::NavigatorConfig;
use crate::metrics::{PerformanceSummary, PipelineMetrics, Stage};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

const VISION: &str = "vision";
const RANGING: &str = "ranging";
const FUSION: &str = "fusion";
const DECISION: &str = "decision";
const GUIDANCE: &str = "guidance";
const NOTIFICATION: &str = "notification";
const TELEMETRY: &str = "telemetry";
const HEALTH: &str = "health";

/// Minimum heartbeat deadline; slow workers get three periods.
const MIN_WORKER_DEADLINE: Duration = Duration::from_secs(3);
/// Pause after a failed worker iteration.
const FAULT_BACKOFF: Duration = Duration::from_millis(100);
/// Wait bound for every queue read.
const QUEUE_POLL: Duration = Duration::from_millis(50);
/// Wait bound for a single collaborator call.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(1);
const DETECTION_LATENCY_WARN_MS: f64 = 300.0;
const RANGING_SILENCE_WARN: Duration = Duration::from_secs(2);

type SharedDetectionSource = Arc<AsyncMutex<Box<dyn DetectionSource>>>;
type SharedRangingSource = Arc<AsyncMutex<Box<dyn RangingSource>>>;
type SharedSink = Arc<AsyncMutex<Box<dyn AlertSink>>>;

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime threshold updates
// ─────────────────────────────────────────────────────────────────────────────

/// Partial update for [`Navigator::set_thresholds`]; `None` keeps the current
/// value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThresholdUpdate {
    pub emergency_cm: Option<f32>,
    pub alert_cm: Option<f32>,
    pub warning_cm: Option<f32>,
    pub min_vocal_interval: Option<Duration>,
}

// ─────────────────────────────────────────────────────────────────────────────
// PipelineContext
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the workers share.  Built once per [`Navigator`] and handed to
/// each worker as an `Arc`.
pub(crate) struct PipelineContext {
    config: NavigatorConfig,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    model: OccupancyModel,
    fuser: DetectionFuser,
    policy: RwLock<AlertPolicy>,
    planner: Mutex<GuidancePlanner>,
    machine: Mutex<StateMachine>,
    gate: Mutex<AnnouncementGate>,
    watchdog: Mutex<Watchdog>,
    detections: FreshQueue<Vec<Detection>>,
    readings: FreshQueue<RangingReading>,
    alerts: AlertQueue,
    last_ranging_at: Mutex<Option<Instant>>,
    bus: EventBus,
    metrics: PipelineMetrics,
}

impl PipelineContext {
    fn new(config: NavigatorConfig) -> Result<Self, NavError> {
        config.validate()?;
        let now = Instant::now();
        Ok(Self {
            running: AtomicBool::new(false),
            stop_tx: watch::channel(false).0,
            model: OccupancyModel::new(config.occupancy_config()),
            fuser: DetectionFuser::new(config.fusion_config()),
            policy: RwLock::new(AlertPolicy::new(config.alert_thresholds())?),
            planner: Mutex::new(GuidancePlanner::new(config.guidance_config())),
            machine: Mutex::new(StateMachine::new(config.state_machine_config(), now)),
            gate: Mutex::new(AnnouncementGate::new(
                config.min_vocal_interval(),
                config.repeat_window(),
            )),
            watchdog: Mutex::new(Watchdog::new()),
            detections: FreshQueue::new(config.system.detection_queue_capacity),
            readings: FreshQueue::new(config.system.ranging_queue_capacity),
            alerts: AlertQueue::new(config.outbound.alert_queue_capacity),
            last_ranging_at: Mutex::new(None),
            bus: EventBus::default(),
            metrics: PipelineMetrics::new(),
            config,
        })
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn state(&self) -> NavState {
        locked(&self.machine).state()
    }

    fn heartbeat(&self, worker: &str) {
        locked(&self.watchdog).heartbeat(worker);
    }

    fn report_fault(&self, worker: &str, err: &NavError) {
        error!(worker, error = %err, "worker iteration failed");
        self.metrics.record_fault();
        self.bus.emit(Event::new(
            format!("navsight-runtime::{worker}"),
            EventPayload::WorkerFault {
                worker: worker.to_string(),
                message: err.to_string(),
            },
        ));
    }

    fn publish_transition(&self, t: StateTransition) {
        if matches!(t.to, NavState::Scanning | NavState::Idle) {
            locked(&self.planner).invalidate_cache();
        }
        self.bus.emit(Event::new(
            "navsight-runtime::state_machine",
            EventPayload::StateChanged(t),
        ));
    }

    /// Queue an alert, counting anything the queue had to drop.
    fn enqueue(&self, alert: Alert) -> PushOutcome {
        let outcome = self.alerts.push(alert);
        if !matches!(outcome, PushOutcome::Queued) {
            self.metrics.record_dropped_alert();
        }
        outcome
    }

    /// Pass `alert` through the announcement gate and queue it if admitted.
    fn announce(&self, alert: Alert, now: Instant) -> bool {
        let verdict = locked(&self.gate).check(&alert.message, now);
        match verdict {
            GateVerdict::Admitted => {
                self.enqueue(alert);
                true
            }
            GateVerdict::TooSoon | GateVerdict::Repeated => {
                debug!(?verdict, message = %alert.message, "announcement suppressed");
                self.metrics.record_suppressed();
                false
            }
        }
    }

    fn queue_depths(&self) -> QueueDepths {
        QueueDepths {
            detections: self.detections.len(),
            ranging: self.readings.len(),
            alerts: self.alerts.len(),
        }
    }

    fn telemetry(&self) -> TelemetryData {
        let snapshot = self.model.snapshot(Instant::now());
        TelemetryData {
            state: self.state(),
            uptime_s: self.metrics.uptime().as_secs_f64(),
            queues: self.queue_depths(),
            latency: self.metrics.latency(),
            counters: self.metrics.counters(),
            min_distance_cm: snapshot.min_distance_cm(),
            closest_bearing_deg: snapshot.closest_bearing_deg(),
            bin_distances_cm: snapshot.bin_distances(),
        }
    }

    fn drain_queues(&self) {
        let batches = self.detections.drain().len();
        let readings = self.readings.drain().len();
        let alerts = self.alerts.drain().len();
        debug!(batches, readings, alerts, "queues drained");
    }

    fn worker_deadline(&self, worker: &str) -> Duration {
        let period = match worker {
            VISION => self.config.frame_period(),
            RANGING => self.config.ranging_period(),
            DECISION => self.config.decision_period(),
            GUIDANCE => self.config.guidance_period(),
            TELEMETRY => self.config.telemetry_period(),
            HEALTH => self.config.health_period(),
            _ => QUEUE_POLL,
        };
        MIN_WORKER_DEADLINE.max(period * 3)
    }
}

/// Wait for the next tick, or return `false` once shutdown is signalled.
async fn tick_or_stop(ticker: &mut Interval, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = ticker.tick() => true,
        _ = stop.wait_for(|s| *s) => false,
    }
}

fn ticker(period: Duration) -> Interval {
    let mut t = interval(period.max(Duration::from_millis(1)));
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervision
// ─────────────────────────────────────────────────────────────────────────────

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Run `body` until it returns.  A panic is reported as a worker fault and
/// the body restarted after [`FAULT_BACKOFF`] for as long as the pipeline
/// runs.
async fn supervise<F, Fut>(ctx: Arc<PipelineContext>, worker: &'static str, mut body: F)
where
    F: FnMut(Arc<PipelineContext>) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let outcome = AssertUnwindSafe(body(Arc::clone(&ctx))).catch_unwind().await;
        let Err(payload) = outcome else { break };

        let err = NavError::WorkerPanicked {
            worker: worker.to_string(),
            message: panic_message(payload.as_ref()),
        };
        drop(payload);
        ctx.report_fault(worker, &err);
        if !ctx.is_running() {
            break;
        }
        tokio::time::sleep(FAULT_BACKOFF).await;
        if !ctx.is_running() {
            break;
        }
        info!(worker, "restarting worker");
    }
}

fn spawn_supervised<F, Fut>(
    ctx: &Arc<PipelineContext>,
    worker: &'static str,
    body: F,
) -> (&'static str, JoinHandle<()>)
where
    F: FnMut(Arc<PipelineContext>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    (worker, tokio::spawn(supervise(Arc::clone(ctx), worker, body)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Workers
// ─────────────────────────────────────────────────────────────────────────────

async fn vision_worker(ctx: Arc<PipelineContext>, source: SharedDetectionSource) {
    let mut source = source.lock().await;
    let mut stop = ctx.stop_tx.subscribe();
    let mut ticker = ticker(ctx.config.frame_period());

    while ctx.is_running() && tick_or_stop(&mut ticker, &mut stop).await {
        ctx.heartbeat(VISION);
        let started = Instant::now();
        match timeout(SOURCE_TIMEOUT, source.next_batch()).await {
            Ok(Ok(batch)) => {
                ctx.metrics.record_latency(Stage::Detection, started.elapsed());
                ctx.metrics.record_batch(batch.len());
                if batch.is_empty() {
                    continue;
                }
                if ctx.detections.push(batch).is_some() {
                    ctx.metrics.record_dropped_detection_batch();
                    debug!("detection queue full; oldest batch dropped");
                }
            }
            Ok(Err(e)) => {
                ctx.report_fault(VISION, &e);
                tokio::time::sleep(FAULT_BACKOFF).await;
            }
            Err(_) => debug!(source = source.id(), "detection source timed out"),
        }
    }
    debug!(worker = VISION, "worker stopped");
}

async fn ranging_worker(ctx: Arc<PipelineContext>, source: SharedRangingSource) {
    let mut source = source.lock().await;
    let mut stop = ctx.stop_tx.subscribe();
    let mut ticker = ticker(ctx.config.ranging_period());
    let (min_cm, max_cm) = (
        ctx.config.ranging.min_distance_cm,
        ctx.config.ranging.max_distance_cm,
    );

    while ctx.is_running() && tick_or_stop(&mut ticker, &mut stop).await {
        ctx.heartbeat(RANGING);
        match timeout(SOURCE_TIMEOUT, source.read()).await {
            Ok(Ok(reading)) => {
                if !reading.is_valid() || !(min_cm..=max_cm).contains(&reading.distance_cm) {
                    debug!(distance_cm = reading.distance_cm, "ranging reading out of range; dropped");
                    ctx.metrics.record_rejected();
                    continue;
                }
                ctx.metrics.record_ranging();
                *locked(&ctx.last_ranging_at) = Some(reading.timestamp);
                if ctx.readings.push(reading).is_some() {
                    ctx.metrics.record_dropped_ranging();
                }
            }
            Ok(Err(e)) => {
                ctx.report_fault(RANGING, &e);
                tokio::time::sleep(FAULT_BACKOFF).await;
            }
            Err(_) => debug!(source = source.id(), "ranging source timed out"),
        }
    }
    debug!(worker = RANGING, "worker stopped");
}

async fn fusion_worker(ctx: Arc<PipelineContext>) {
    let fresh = ctx.config.ranging_fresh();
    let mut last_reading: Option<RangingReading> = None;
    let mut applied_alone: Option<Instant> = None;

    while ctx.is_running() {
        ctx.heartbeat(FUSION);
        if let Some(r) = ctx.readings.drain().pop() {
            last_reading = Some(r);
        }

        match ctx.detections.recv_timeout(QUEUE_POLL).await {
            Some(batch) => {
                let started = Instant::now();
                let updates = ctx.fuser.fuse(&batch, last_reading.as_ref());
                for update in &updates {
                    update.apply_to(&ctx.model);
                }
                ctx.metrics.record_latency(Stage::Fusion, started.elapsed());
            }
            None => {
                // No camera data: let a fresh ultrasonic reading speak alone.
                if let Some(r) = last_reading
                    && applied_alone != Some(r.timestamp)
                    && r.timestamp.elapsed() < fresh
                {
                    ctx.model.update_from_ranging_only(r.distance_cm, 0.0, r.timestamp);
                    applied_alone = Some(r.timestamp);
                }
            }
        }
    }
    debug!(worker = FUSION, "worker stopped");
}

async fn decision_worker(ctx: Arc<PipelineContext>) {
    let mut stop = ctx.stop_tx.subscribe();
    let mut ticker = ticker(ctx.config.decision_period());

    while ctx.is_running() && tick_or_stop(&mut ticker, &mut stop).await {
        ctx.heartbeat(DECISION);
        let now = Instant::now();
        let snapshot = ctx.model.snapshot(now);
        let state = ctx.state();
        let decision = ctx
            .policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .evaluate(&snapshot, state);

        if let Decision::Alert {
            level,
            message,
            distance_cm,
            bearing_deg,
            ..
        } = &decision
        {
            let alert = Alert::new(level.priority(), message.clone(), AlertOrigin::Decision)
                .with_location(*distance_cm, *bearing_deg);
            if ctx.announce(alert, now) {
                ctx.metrics.record_warning();
            }
        }

        let transition = locked(&ctx.machine).apply(&decision, now);
        if let Some(t) = transition {
            ctx.publish_transition(t);
        }
        ctx.metrics.record_latency(Stage::Decision, now.elapsed());
    }
    debug!(worker = DECISION, "worker stopped");
}

async fn guidance_worker(ctx: Arc<PipelineContext>) {
    let mut stop = ctx.stop_tx.subscribe();
    let mut ticker = ticker(ctx.config.guidance_period());

    while ctx.is_running() && tick_or_stop(&mut ticker, &mut stop).await {
        ctx.heartbeat(GUIDANCE);
        if !ctx.state().is_active() {
            continue;
        }
        let now = Instant::now();
        let snapshot = ctx.model.snapshot(now);
        let guidance = locked(&ctx.planner).get_guidance(&snapshot, now);
        debug!(action = guidance.action.tag(), confidence = guidance.confidence, "guidance");

        ctx.bus.emit(Event::new(
            "navsight-runtime::guidance",
            EventPayload::GuidanceIssued(guidance),
        ));
        let alert = Alert::new(AlertPriority::Medium, guidance.message(), AlertOrigin::Guidance);
        ctx.announce(alert, now);
    }
    debug!(worker = GUIDANCE, "worker stopped");
}

async fn notification_worker(ctx: Arc<PipelineContext>, sink: SharedSink) {
    let mut sink = sink.lock().await;

    while ctx.is_running() {
        ctx.heartbeat(NOTIFICATION);
        let Some(alert) = ctx.alerts.recv_timeout(QUEUE_POLL).await else {
            continue;
        };
        match sink.deliver(&alert).await {
            Ok(()) => {
                ctx.bus.emit(Event::new(
                    "navsight-runtime::notification",
                    EventPayload::AlertIssued(alert),
                ));
            }
            Err(e) => {
                ctx.report_fault(NOTIFICATION, &e);
                tokio::time::sleep(FAULT_BACKOFF).await;
            }
        }
    }
    debug!(worker = NOTIFICATION, "worker stopped");
}

async fn telemetry_worker(ctx: Arc<PipelineContext>) {
    let mut stop = ctx.stop_tx.subscribe();
    let mut ticker = ticker(ctx.config.telemetry_period());

    while ctx.is_running() && tick_or_stop(&mut ticker, &mut stop).await {
        ctx.heartbeat(TELEMETRY);
        let report = ctx.telemetry();
        debug!(state = %report.state, min_distance_cm = ?report.min_distance_cm, "telemetry");
        ctx.bus.emit(Event::new(
            "navsight-runtime::telemetry",
            EventPayload::Telemetry(Box::new(report)),
        ));
    }
    debug!(worker = TELEMETRY, "worker stopped");
}

async fn health_worker(ctx: Arc<PipelineContext>) {
    let mut stop = ctx.stop_tx.subscribe();
    let mut ticker = ticker(ctx.config.health_period());
    let started = Instant::now();

    while ctx.is_running() && tick_or_stop(&mut ticker, &mut stop).await {
        ctx.heartbeat(HEALTH);
        let now = Instant::now();

        let stalled = locked(&ctx.watchdog).check_all_at(now);
        for worker in stalled {
            let err = NavError::Channel(format!("worker {worker} missed its heartbeat deadline"));
            warn!(worker = %worker, "worker stalled");
            ctx.report_fault(HEALTH, &err);
        }

        let depths = ctx.queue_depths();
        if depths.detections >= ctx.detections.capacity()
            || depths.alerts * 4 >= ctx.alerts.capacity() * 3
        {
            warn!(
                detections = depths.detections,
                alerts = depths.alerts,
                "pipeline queues saturated"
            );
        }

        let latency = ctx.metrics.latency();
        if latency.detection_ms > DETECTION_LATENCY_WARN_MS {
            warn!(detection_ms = latency.detection_ms, "detection latency high");
        }

        let last_ranging = *locked(&ctx.last_ranging_at);
        let silence = match last_ranging {
            Some(t) => now.saturating_duration_since(t),
            None => now.saturating_duration_since(started),
        };
        if silence > RANGING_SILENCE_WARN {
            warn!(silent_for_s = silence.as_secs_f32(), "no fresh ultrasonic reading");
        }
    }
    debug!(worker = HEALTH, "worker stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the pipeline and its collaborators.  Lifecycle: `new → start → stop`,
/// restartable.
pub struct Navigator {
    ctx: Arc<PipelineContext>,
    detection: SharedDetectionSource,
    ranging: SharedRangingSource,
    sink: SharedSink,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Navigator {
    /// Validate `config` and wire the collaborators.  Nothing runs until
    /// [`start`][Self::start].
    pub fn new(
        config: NavigatorConfig,
        detection: Box<dyn DetectionSource>,
        ranging: Box<dyn RangingSource>,
        sink: Box<dyn AlertSink>,
    ) -> Result<Self, NavError> {
        Ok(Self {
            ctx: Arc::new(PipelineContext::new(config)?),
            detection: Arc::new(AsyncMutex::new(detection)),
            ranging: Arc::new(AsyncMutex::new(ranging)),
            sink: Arc::new(AsyncMutex::new(sink)),
            workers: Vec::new(),
        })
    }

    /// Open the sensors, enter `Scanning` and spawn every worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&mut self) -> Result<(), NavError> {
        if self.ctx.is_running() {
            return Err(NavError::AlreadyRunning);
        }
        self.detection.lock().await.open().await?;
        self.ranging.lock().await.open().await?;

        let ctx = &self.ctx;
        let now = Instant::now();
        ctx.model.clear();
        ctx.drain_queues();
        locked(&ctx.gate).reset();
        locked(&ctx.planner).invalidate_cache();
        *locked(&ctx.last_ranging_at) = None;
        ctx.metrics.reset();
        {
            let mut wd = locked(&ctx.watchdog);
            for worker in [VISION, RANGING, FUSION, DECISION, GUIDANCE, NOTIFICATION, TELEMETRY, HEALTH] {
                wd.register_at(worker, ctx.worker_deadline(worker), now);
            }
        }

        ctx.stop_tx.send_replace(false);
        ctx.running.store(true, Ordering::Release);
        let transition = locked(&ctx.machine).start(now);
        if let Some(t) = transition {
            ctx.publish_transition(t);
        }

        let detection = Arc::clone(&self.detection);
        let ranging = Arc::clone(&self.ranging);
        let sink = Arc::clone(&self.sink);
        self.workers = vec![
            spawn_supervised(ctx, VISION, move |ctx| vision_worker(ctx, Arc::clone(&detection))),
            spawn_supervised(ctx, RANGING, move |ctx| ranging_worker(ctx, Arc::clone(&ranging))),
            spawn_supervised(ctx, FUSION, fusion_worker),
            spawn_supervised(ctx, DECISION, decision_worker),
            spawn_supervised(ctx, GUIDANCE, guidance_worker),
            spawn_supervised(ctx, NOTIFICATION, move |ctx| notification_worker(ctx, Arc::clone(&sink))),
            spawn_supervised(ctx, TELEMETRY, telemetry_worker),
            spawn_supervised(ctx, HEALTH, health_worker),
        ];
        info!(workers = self.workers.len(), "navigation pipeline started");
        Ok(())
    }

    /// Signal shutdown, drain the queues, join every worker with a bounded
    /// wait and return to `Idle`.
    pub async fn stop(&mut self) -> Result<(), NavError> {
        if !self.ctx.is_running() {
            return Err(NavError::NotRunning);
        }
        info!("stopping navigation pipeline");
        self.ctx.running.store(false, Ordering::Release);
        self.ctx.stop_tx.send_replace(true);
        self.ctx.drain_queues();

        let join_timeout = self.ctx.config.join_timeout();
        for (name, mut handle) in self.workers.drain(..) {
            match timeout(join_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker = name, error = %e, "worker ended abnormally"),
                Err(_) => {
                    warn!(worker = name, "worker did not stop in time; aborting");
                    handle.abort();
                }
            }
        }

        let transition = locked(&self.ctx.machine).shutdown(Instant::now());
        if let Some(t) = transition {
            self.ctx.publish_transition(t);
        }
        let c = self.ctx.metrics.counters();
        info!(
            uptime_s = self.ctx.metrics.uptime().as_secs_f64(),
            batches = c.batches_processed,
            detections = c.detections,
            warnings = c.warnings_issued,
            "navigation pipeline stopped"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    pub fn state(&self) -> NavState {
        self.ctx.state()
    }

    /// Current decayed occupancy snapshot.
    pub fn snapshot(&self) -> OccupancySnapshot {
        self.ctx.model.snapshot(Instant::now())
    }

    /// One-word action for haptic feedback, from the (cached) guidance.
    pub fn immediate_action(&self) -> &'static str {
        let now = Instant::now();
        let snapshot = self.ctx.model.snapshot(now);
        locked(&self.ctx.planner).suggest_immediate_action(&snapshot, now)
    }

    /// Bearings currently free for at least `min_clearance_cm`.
    pub fn safe_directions(&self, min_clearance_cm: f32) -> Vec<f32> {
        GuidancePlanner::safe_directions(&self.snapshot(), min_clearance_cm)
    }

    /// Recent state transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        locked(&self.ctx.machine).history().copied().collect()
    }

    /// Point-in-time telemetry report.
    pub fn metrics(&self) -> TelemetryData {
        self.ctx.telemetry()
    }

    pub fn performance(&self) -> PerformanceSummary {
        self.ctx.metrics.performance(self.state())
    }

    pub fn reset_statistics(&self) {
        self.ctx.metrics.reset();
        info!("pipeline statistics reset");
    }

    /// Queue `text` for immediate delivery, bypassing rate limiting and
    /// repeat suppression.
    pub fn force_announce(&self, text: impl Into<String>, priority: AlertPriority) -> Result<(), NavError> {
        if !self.ctx.is_running() {
            return Err(NavError::NotRunning);
        }
        let alert = Alert::new(priority, text, AlertOrigin::Forced);
        info!(message = %alert.message, priority = priority.value(), "forced announcement");
        match self.ctx.enqueue(alert) {
            PushOutcome::Rejected(_) => Err(NavError::Channel(
                "alert queue full of more urgent alerts".into(),
            )),
            PushOutcome::Queued | PushOutcome::Evicted(_) => Ok(()),
        }
    }

    /// Change alert distances and/or the minimum speech interval at runtime.
    pub fn set_thresholds(&self, update: ThresholdUpdate) -> Result<(), NavError> {
        let mut policy = self
            .ctx
            .policy
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut thresholds = *policy.thresholds();
        if let Some(v) = update.emergency_cm {
            thresholds.emergency_cm = v;
        }
        if let Some(v) = update.alert_cm {
            thresholds.alert_cm = v;
        }
        if let Some(v) = update.warning_cm {
            thresholds.warning_cm = v;
        }
        *policy = AlertPolicy::new(thresholds)?;
        if let Some(interval) = update.min_vocal_interval {
            locked(&self.ctx.gate).set_min_interval(interval);
        }
        info!(?thresholds, min_vocal_interval = ?update.min_vocal_interval, "thresholds updated");
        Ok(())
    }

    pub fn update_guidance_preferences(
        &self,
        clear_path_threshold_cm: Option<f32>,
        min_safe_angle_deg: Option<f32>,
        preferred_direction: Option<Side>,
    ) {
        locked(&self.ctx.planner).update_preferences(
            clear_path_threshold_cm,
            min_safe_angle_deg,
            preferred_direction,
        );
    }

    /// A handle on the event bus; subscribe before [`start`][Self::start] to
    /// see the first transition.
    pub fn bus(&self) -> EventBus {
        self.ctx.bus.clone()
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.ctx.config
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        if self.ctx.is_running() {
            self.ctx.running.store(false, Ordering::Release);
            self.ctx.stop_tx.send_replace(true);
            for (_, handle) in &self.workers {
                handle.abort();
            }
        }
    }
}
