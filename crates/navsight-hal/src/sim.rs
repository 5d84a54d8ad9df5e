//! In-process simulation drivers for tests and demos without hardware.
//!
//! Each driver plays back a script.  Timestamps are taken when an item is
//! emitted so detections and readings produced together associate the way
//! live data would.
//!
//! # Example
//!
//! ```rust
//! use navsight_hal::sim::{ScriptedDetectionSource, SimObject};
//! use navsight_hal::DetectionSource;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let mut cam = ScriptedDetectionSource::new("cam")
//!         .with_batch(vec![SimObject::new("person", 0.0, 120.0)]);
//!     cam.open().await.unwrap();
//!     let batch = cam.next_batch().await.unwrap();
//!     assert_eq!(batch[0].class_name, "person");
//! });
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use navsight_types::{Alert, BoundingBox, Detection, NavError, RangingReading};
use tracing::debug;

use crate::sink::AlertSink;
use crate::source::{DetectionSource, RangingSource};

/// Field of view assumed when synthesising bounding boxes.
const SIM_FOV_DEG: f32 = 62.2;

// ────────────────────────────────────────────────────────────────────────────
// Detections
// ────────────────────────────────────────────────────────────────────────────

/// One object placed in the simulated scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SimObject {
    pub class_name: String,
    pub bearing_deg: f32,
    pub distance_cm: f32,
    pub confidence: f32,
}

impl SimObject {
    pub fn new(class_name: impl Into<String>, bearing_deg: f32, distance_cm: f32) -> Self {
        Self {
            class_name: class_name.into(),
            bearing_deg,
            distance_cm,
            confidence: 0.9,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    fn to_detection(&self, at: Instant) -> Detection {
        let center_x = (self.bearing_deg / SIM_FOV_DEG + 0.5).clamp(0.0, 1.0);
        // Nearer objects fill more of the frame.
        let h = (100.0 / self.distance_cm.max(1.0)).clamp(0.05, 1.0);
        let w = h * 0.4;
        Detection::new(
            self.class_name.clone(),
            self.confidence,
            BoundingBox::new((center_x - w / 2.0).max(0.0), 0.5 - h / 2.0, w, h),
            at,
        )
        .with_bearing(self.bearing_deg)
        .with_distance(self.distance_cm)
    }
}

#[derive(Debug, Clone)]
enum Step<T> {
    Emit(T),
    Fail(String),
}

/// Plays back a script of detection batches, one per `period`.
///
/// When the script runs out the source either loops or yields empty batches.
pub struct ScriptedDetectionSource {
    id: String,
    script: Vec<Step<Vec<SimObject>>>,
    cursor: usize,
    period: Duration,
    looping: bool,
    fail_open: bool,
}

impl ScriptedDetectionSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Vec::new(),
            cursor: 0,
            period: Duration::ZERO,
            looping: false,
            fail_open: false,
        }
    }

    pub fn with_batch(mut self, objects: Vec<SimObject>) -> Self {
        self.script.push(Step::Emit(objects));
        self
    }

    /// Append `count` copies of the same batch.
    pub fn with_repeated(mut self, objects: Vec<SimObject>, count: usize) -> Self {
        for _ in 0..count {
            self.script.push(Step::Emit(objects.clone()));
        }
        self
    }

    /// Append a step whose `next_batch` fails.
    pub fn with_failure(mut self, details: impl Into<String>) -> Self {
        self.script.push(Step::Fail(details.into()));
        self
    }

    /// Delay applied before every batch, emulating the camera frame rate.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn next_step(&mut self) -> Option<Step<Vec<SimObject>>> {
        if self.cursor >= self.script.len() {
            if !self.looping || self.script.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let step = self.script[self.cursor].clone();
        self.cursor += 1;
        Some(step)
    }
}

#[async_trait]
impl DetectionSource for ScriptedDetectionSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open(&mut self) -> Result<(), NavError> {
        if self.fail_open {
            return Err(NavError::SensorUnavailable {
                sensor: self.id.clone(),
                details: "simulated open failure".into(),
            });
        }
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Vec<Detection>, NavError> {
        if !self.period.is_zero() {
            tokio::time::sleep(self.period).await;
        }
        let now = Instant::now();
        match self.next_step() {
            Some(Step::Emit(objects)) => Ok(objects.iter().map(|o| o.to_detection(now)).collect()),
            Some(Step::Fail(details)) => Err(NavError::SensorRead {
                sensor: self.id.clone(),
                details,
            }),
            None => Ok(Vec::new()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ranging
// ────────────────────────────────────────────────────────────────────────────

/// Plays back a script of ultrasonic distances, one per `period`.
///
/// A timeout step returns the previous reading unchanged, as a real driver
/// would.  After the script ends the last distance is repeated with a fresh
/// timestamp unless the source loops.
pub struct ScriptedRangingSource {
    id: String,
    script: Vec<Step<Option<f32>>>,
    cursor: usize,
    period: Duration,
    looping: bool,
    fail_open: bool,
    last: Option<RangingReading>,
}

impl ScriptedRangingSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Vec::new(),
            cursor: 0,
            period: Duration::ZERO,
            looping: false,
            fail_open: false,
            last: None,
        }
    }

    pub fn with_readings(mut self, distances_cm: impl IntoIterator<Item = f32>) -> Self {
        self.script
            .extend(distances_cm.into_iter().map(|d| Step::Emit(Some(d))));
        self
    }

    /// Append a step on which the sensor does not answer in time.
    pub fn with_timeout(mut self) -> Self {
        self.script.push(Step::Emit(None));
        self
    }

    pub fn with_failure(mut self, details: impl Into<String>) -> Self {
        self.script.push(Step::Fail(details.into()));
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn next_step(&mut self) -> Option<Step<Option<f32>>> {
        if self.cursor >= self.script.len() {
            if !self.looping || self.script.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let step = self.script[self.cursor].clone();
        self.cursor += 1;
        Some(step)
    }

    fn previous(&self) -> Result<RangingReading, NavError> {
        self.last.ok_or_else(|| NavError::SensorRead {
            sensor: self.id.clone(),
            details: "no reading available yet".into(),
        })
    }
}

#[async_trait]
impl RangingSource for ScriptedRangingSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open(&mut self) -> Result<(), NavError> {
        if self.fail_open {
            return Err(NavError::SensorUnavailable {
                sensor: self.id.clone(),
                details: "simulated open failure".into(),
            });
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<RangingReading, NavError> {
        if !self.period.is_zero() {
            tokio::time::sleep(self.period).await;
        }
        let now = Instant::now();
        match self.next_step() {
            Some(Step::Emit(Some(distance_cm))) => {
                let reading = RangingReading::new(distance_cm, now);
                self.last = Some(reading);
                Ok(reading)
            }
            Some(Step::Emit(None)) => {
                debug!(sensor = %self.id, "simulated ranging timeout");
                self.previous()
            }
            Some(Step::Fail(details)) => Err(NavError::SensorRead {
                sensor: self.id.clone(),
                details,
            }),
            None => {
                let reading = RangingReading::new(self.previous()?.distance_cm, now);
                self.last = Some(reading);
                Ok(reading)
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recording sink
// ────────────────────────────────────────────────────────────────────────────

/// Shared view of everything a [`RecordingSink`] delivered.
#[derive(Debug, Clone, Default)]
pub struct SinkRecord {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl SinkRecord {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.message).collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sink that stores every alert for later inspection.
pub struct RecordingSink {
    id: String,
    record: SinkRecord,
    failures_left: usize,
    panics_left: usize,
}

impl RecordingSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record: SinkRecord::default(),
            failures_left: 0,
            panics_left: 0,
        }
    }

    /// Fail the next `n` deliveries.
    pub fn failing(mut self, n: usize) -> Self {
        self.failures_left = n;
        self
    }

    /// Panic inside the next `n` deliveries, emulating a crashing speech
    /// driver.
    pub fn panicking(mut self, n: usize) -> Self {
        self.panics_left = n;
        self
    }

    pub fn record(&self) -> SinkRecord {
        self.record.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&mut self, alert: &Alert) -> Result<(), NavError> {
        if self.panics_left > 0 {
            self.panics_left -= 1;
            panic!("{}: simulated driver crash", self.id);
        }
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(NavError::Sink(format!("{}: simulated delivery failure", self.id)));
        }
        self.record
            .alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Demo scenario
// ────────────────────────────────────────────────────────────────────────────

/// A pedestrian walking toward the wearer, stepping aside, then a clear
/// stretch.  Loops forever at `period` per frame.
pub fn approaching_pedestrian(period: Duration) -> (ScriptedDetectionSource, ScriptedRangingSource) {
    let mut camera = ScriptedDetectionSource::new("sim_camera")
        .with_period(period)
        .looping();
    let mut ranging = ScriptedRangingSource::new("sim_ultrasound")
        .with_period(period)
        .looping();

    let approach: Vec<f32> = (0..26).map(|i| 300.0 - i as f32 * 10.0).collect();
    for &d in &approach {
        camera = camera.with_batch(vec![
            SimObject::new("person", 0.0, d),
            SimObject::new("car", -25.0, 350.0).with_confidence(0.7),
        ]);
    }
    ranging = ranging.with_readings(approach);

    let aside: Vec<f32> = (0..10).map(|i| 24.0 + i as f32 * 0.5).collect();
    for &bearing in &aside {
        camera = camera.with_batch(vec![SimObject::new("person", bearing, 60.0)]);
    }
    ranging = ranging.with_readings(std::iter::repeat_n(380.0, aside.len()));

    camera = camera.with_repeated(Vec::new(), 30);
    ranging = ranging.with_readings(std::iter::repeat_n(390.0, 30));

    (camera, ranging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use navsight_types::{AlertOrigin, AlertPriority};

    #[tokio::test]
    async fn detection_script_plays_in_order_then_empties() {
        let mut cam = ScriptedDetectionSource::new("cam")
            .with_batch(vec![SimObject::new("person", -10.0, 150.0)])
            .with_failure("lens cap");
        cam.open().await.unwrap();

        let batch = cam.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].bearing_deg, Some(-10.0));
        assert_eq!(batch[0].distance_cm, Some(150.0));
        assert!(batch[0].bbox.center_x() < 0.5);

        assert!(matches!(cam.next_batch().await, Err(NavError::SensorRead { .. })));
        assert!(cam.next_batch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn looping_detection_script_restarts() {
        let mut cam = ScriptedDetectionSource::new("cam")
            .with_batch(vec![SimObject::new("car", 0.0, 300.0)])
            .looping();
        for _ in 0..3 {
            assert_eq!(cam.next_batch().await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn failing_open_reports_unavailable() {
        let mut cam = ScriptedDetectionSource::new("cam").failing_open();
        assert!(matches!(cam.open().await, Err(NavError::SensorUnavailable { .. })));
        let mut us = ScriptedRangingSource::new("us").failing_open();
        assert!(us.open().await.is_err());
    }

    #[tokio::test]
    async fn ranging_timeout_returns_previous_value() {
        let mut us = ScriptedRangingSource::new("us")
            .with_timeout()
            .with_readings([120.0])
            .with_timeout();

        assert!(us.read().await.is_err());
        let first = us.read().await.unwrap();
        let repeat = us.read().await.unwrap();
        assert_eq!(first, repeat);
    }

    #[tokio::test]
    async fn ranging_holds_last_distance_after_script() {
        let mut us = ScriptedRangingSource::new("us").with_readings([80.0]);
        let first = us.read().await.unwrap();
        let held = us.read().await.unwrap();
        assert_eq!(held.distance_cm, 80.0);
        assert!(held.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn recording_sink_keeps_alerts_and_can_fail() {
        let mut sink = RecordingSink::new("speaker").failing(1);
        let record = sink.record();
        let alert = Alert::new(AlertPriority::Emergency, "Stop!", AlertOrigin::Decision);

        assert!(matches!(sink.deliver(&alert).await, Err(NavError::Sink(_))));
        assert!(record.is_empty());
        sink.deliver(&alert).await.unwrap();
        assert_eq!(record.messages(), vec!["Stop!".to_string()]);
    }

    #[tokio::test]
    async fn panicking_sink_crashes_inside_deliver() {
        let sink = RecordingSink::new("speaker").panicking(1);
        let record = sink.record();
        let alert = Alert::new(AlertPriority::High, "Obstacle ahead", AlertOrigin::Decision);

        let first = {
            let alert = alert.clone();
            tokio::spawn(async move {
                let mut sink = sink;
                let _ = sink.deliver(&alert).await;
                sink
            })
            .await
        };
        assert!(first.is_err_and(|e| e.is_panic()));
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn demo_scenario_produces_data() {
        let (mut cam, mut us) = approaching_pedestrian(Duration::ZERO);
        assert!(!cam.next_batch().await.unwrap().is_empty());
        assert_eq!(us.read().await.unwrap().distance_cm, 300.0);
    }
}
