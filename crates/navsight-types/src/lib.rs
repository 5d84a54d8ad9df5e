use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Valid range of the ultrasonic ranging sensor, in centimetres.
pub const RANGING_MIN_CM: f32 = 2.0;
pub const RANGING_MAX_CM: f32 = 400.0;

// ────────────────────────────────────────────────────────────────────────────
// Sensor inputs
// ────────────────────────────────────────────────────────────────────────────

/// Normalised bounding box, every component in `[0, 1]` of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Horizontal centre of the box in normalised frame coordinates.
    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }
}

/// One recognised object in one camera frame.
///
/// Produced by the external perception collaborator and discarded after
/// fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Object class label, e.g. `"person"`.
    pub class_name: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Signed bearing in degrees (0 = straight ahead, negative = left).
    pub bearing_deg: Option<f32>,
    /// Distance estimate in centimetres, when the detector provides one.
    pub distance_cm: Option<f32>,
    /// Frame capture time.
    pub timestamp: Instant,
}

impl Detection {
    /// Build a detection without bearing or distance.  `confidence` is
    /// clamped to `[0, 1]`.
    pub fn new(
        class_name: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
        timestamp: Instant,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            bearing_deg: None,
            distance_cm: None,
            timestamp,
        }
    }

    pub fn with_bearing(mut self, bearing_deg: f32) -> Self {
        self.bearing_deg = Some(bearing_deg);
        self
    }

    pub fn with_distance(mut self, distance_cm: f32) -> Self {
        self.distance_cm = Some(distance_cm);
        self
    }
}

/// A single ultrasonic distance sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangingReading {
    pub distance_cm: f32,
    pub timestamp: Instant,
}

impl RangingReading {
    pub fn new(distance_cm: f32, timestamp: Instant) -> Self {
        Self {
            distance_cm,
            timestamp,
        }
    }

    /// `true` when the distance lies inside the sensor's physical range.
    pub fn is_valid(&self) -> bool {
        self.distance_cm.is_finite()
            && (RANGING_MIN_CM..=RANGING_MAX_CM).contains(&self.distance_cm)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Navigation state
// ────────────────────────────────────────────────────────────────────────────

/// Navigation state owned by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    Idle,
    Scanning,
    Alert,
    Guidance,
    Emergency,
    Recover,
}

impl NavState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavState::Idle => "idle",
            NavState::Scanning => "scanning",
            NavState::Alert => "alert",
            NavState::Guidance => "guidance",
            NavState::Emergency => "emergency",
            NavState::Recover => "recover",
        }
    }

    /// States in which an obstacle is being actively handled and the
    /// guidance planner should run.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            NavState::Alert | NavState::Guidance | NavState::Emergency
        )
    }
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single applied state change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: NavState,
    pub to: NavState,
    pub at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Decisions
// ────────────────────────────────────────────────────────────────────────────

/// Outbound message priority.  Lower values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Emergency = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Info = 4,
}

impl AlertPriority {
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl FromStr for AlertPriority {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emergency" => Ok(AlertPriority::Emergency),
            "high" => Ok(AlertPriority::High),
            "medium" => Ok(AlertPriority::Medium),
            "low" => Ok(AlertPriority::Low),
            "info" => Ok(AlertPriority::Info),
            other => Err(NavError::InvalidConfig(format!(
                "unknown alert priority '{other}'"
            ))),
        }
    }
}

/// Severity bucket of an obstacle alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Closer than the emergency distance.
    Emergency,
    /// Closer than the alert distance.
    Alert,
    /// Closer than the warning distance; informational.
    Warning,
}

impl AlertLevel {
    pub fn priority(self) -> AlertPriority {
        match self {
            AlertLevel::Emergency => AlertPriority::Emergency,
            AlertLevel::Alert => AlertPriority::High,
            AlertLevel::Warning => AlertPriority::Medium,
        }
    }

    pub fn suggested_state(self) -> NavState {
        match self {
            AlertLevel::Emergency => NavState::Emergency,
            AlertLevel::Alert => NavState::Alert,
            AlertLevel::Warning => NavState::Scanning,
        }
    }
}

/// Output of the alert policy for one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Nothing within the warning distance (or nothing known at all).
    NoAction,
    /// An obstacle requires the wearer's attention.
    Alert {
        level: AlertLevel,
        message: String,
        distance_cm: f32,
        bearing_deg: f32,
        confidence: f32,
    },
}

impl Decision {
    pub fn action_needed(&self) -> bool {
        matches!(self, Decision::Alert { .. })
    }

    /// Integer priority, `0` being the most urgent.  `NoAction` reports
    /// [`AlertPriority::Info`].
    pub fn priority(&self) -> u8 {
        match self {
            Decision::NoAction => AlertPriority::Info.value(),
            Decision::Alert { level, .. } => level.priority().value(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Decision::NoAction => "",
            Decision::Alert { message, .. } => message,
        }
    }

    pub fn suggested_state(&self) -> Option<NavState> {
        match self {
            Decision::NoAction => None,
            Decision::Alert { level, .. } => Some(level.suggested_state()),
        }
    }

    pub fn level(&self) -> Option<AlertLevel> {
        match self {
            Decision::NoAction => None,
            Decision::Alert { level, .. } => Some(*level),
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Decision::NoAction => 0.0,
            Decision::Alert { confidence, .. } => *confidence,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Guidance
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Side of a signed bearing; zero counts as right.
    pub fn of_bearing(bearing_deg: f32) -> Self {
        if bearing_deg < 0.0 { Side::Left } else { Side::Right }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl FromStr for Side {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "gauche" => Ok(Side::Left),
            "right" | "droite" => Ok(Side::Right),
            other => Err(NavError::InvalidConfig(format!(
                "unknown direction '{other}', expected 'left' or 'right'"
            ))),
        }
    }
}

/// Recommended manoeuvre.  Each variant carries only the fields that are
/// meaningful for it; turn angles are magnitudes, the side lives in the
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GuidanceAction {
    Continue { clear_distance_cm: f32 },
    Stop { clear_distance_cm: f32 },
    SlowDown { clear_distance_cm: f32 },
    MoveSlightly {
        side: Side,
        angle_deg: f32,
        clear_distance_cm: f32,
    },
    MoveLeft { angle_deg: f32, clear_distance_cm: f32 },
    MoveRight { angle_deg: f32, clear_distance_cm: f32 },
}

impl GuidanceAction {
    /// Build a full turn toward `bearing_deg`.
    pub fn turn_toward(bearing_deg: f32, clear_distance_cm: f32) -> Self {
        let angle_deg = bearing_deg.abs();
        match Side::of_bearing(bearing_deg) {
            Side::Left => GuidanceAction::MoveLeft {
                angle_deg,
                clear_distance_cm,
            },
            Side::Right => GuidanceAction::MoveRight {
                angle_deg,
                clear_distance_cm,
            },
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            GuidanceAction::Continue { .. } => "continue",
            GuidanceAction::Stop { .. } => "stop",
            GuidanceAction::SlowDown { .. } => "slow_down",
            GuidanceAction::MoveSlightly { .. } => "move_slightly",
            GuidanceAction::MoveLeft { .. } => "move_left",
            GuidanceAction::MoveRight { .. } => "move_right",
        }
    }

    pub fn clear_distance_cm(&self) -> f32 {
        match *self {
            GuidanceAction::Continue { clear_distance_cm }
            | GuidanceAction::Stop { clear_distance_cm }
            | GuidanceAction::SlowDown { clear_distance_cm }
            | GuidanceAction::MoveSlightly {
                clear_distance_cm, ..
            }
            | GuidanceAction::MoveLeft {
                clear_distance_cm, ..
            }
            | GuidanceAction::MoveRight {
                clear_distance_cm, ..
            } => clear_distance_cm,
        }
    }

    /// Signed direction of travel in degrees; `0.0` for non-turning actions.
    pub fn direction_deg(&self) -> f32 {
        match *self {
            GuidanceAction::MoveLeft { angle_deg, .. } => -angle_deg,
            GuidanceAction::MoveRight { angle_deg, .. } => angle_deg,
            GuidanceAction::MoveSlightly {
                side: Side::Left,
                angle_deg,
                ..
            } => -angle_deg,
            GuidanceAction::MoveSlightly {
                side: Side::Right,
                angle_deg,
                ..
            } => angle_deg,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceReason {
    PathClear,
    CriticalEscape,
    CriticalNoEscape,
    ClearPathFound,
    SlightlyLeft,
    SlightlyRight,
    NarrowPath,
    NoClearPath,
}

/// Output of the guidance planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub action: GuidanceAction,
    pub confidence: f32,
    pub reason: GuidanceReason,
}

impl Guidance {
    /// Spoken form of the recommendation.
    pub fn message(&self) -> String {
        match self.action {
            GuidanceAction::Stop { .. } => "Stop, obstacle ahead".to_string(),
            GuidanceAction::MoveLeft {
                clear_distance_cm, ..
            } => format!(
                "Move left, path clear for {} centimetres",
                clear_distance_cm.round() as i32
            ),
            GuidanceAction::MoveRight {
                clear_distance_cm, ..
            } => format!(
                "Move right, path clear for {} centimetres",
                clear_distance_cm.round() as i32
            ),
            GuidanceAction::MoveSlightly { side, .. } => {
                format!("Bear slightly {}", side.as_str())
            }
            GuidanceAction::SlowDown { .. } => "Slow down, obstacle approaching".to_string(),
            GuidanceAction::Continue { .. } => "Continue carefully".to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound alerts
// ────────────────────────────────────────────────────────────────────────────

/// Where an outbound alert originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrigin {
    Decision,
    Guidance,
    /// Manual announcement; bypasses rate limiting.
    Forced,
}

/// One message handed to the speech / haptic collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub priority: AlertPriority,
    pub message: String,
    pub origin: AlertOrigin,
    pub distance_cm: Option<f32>,
    pub bearing_deg: Option<f32>,
    pub issued_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(priority: AlertPriority, message: impl Into<String>, origin: AlertOrigin) -> Self {
        Self {
            priority,
            message: message.into(),
            origin,
            distance_cm: None,
            bearing_deg: None,
            issued_at: Utc::now(),
        }
    }

    pub fn with_location(mut self, distance_cm: f32, bearing_deg: f32) -> Self {
        self.distance_cm = Some(distance_cm);
        self.bearing_deg = Some(bearing_deg);
        self
    }

    pub fn is_forced(&self) -> bool {
        self.origin == AlertOrigin::Forced
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the navigation event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "navsight-runtime::decision"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    StateChanged(StateTransition),
    GuidanceIssued(Guidance),
    AlertIssued(Alert),
    Telemetry(Box<TelemetryData>),
    WorkerFault { worker: String, message: String },
}

/// Number of items currently waiting in each pipeline queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDepths {
    pub detections: usize,
    pub ranging: usize,
    pub alerts: usize,
}

/// Rolling average stage latencies in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub detection_ms: f64,
    pub fusion_ms: f64,
    pub decision_ms: f64,
}

/// Monotonic pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub batches_processed: u64,
    pub detections: u64,
    pub ranging_readings: u64,
    pub rejected_inputs: u64,
    pub warnings_issued: u64,
    pub suppressed_alerts: u64,
    pub dropped_detection_batches: u64,
    pub dropped_ranging_readings: u64,
    pub dropped_alerts: u64,
    pub worker_faults: u64,
}

/// Periodic pipeline telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryData {
    pub state: NavState,
    pub uptime_s: f64,
    pub queues: QueueDepths,
    pub latency: LatencyStats,
    pub counters: PipelineCounters,
    pub min_distance_cm: Option<f32>,
    pub closest_bearing_deg: f32,
    /// Per-bin smoothed distance, `None` for unknown bins.
    pub bin_distances_cm: Vec<Option<f32>>,
}

/// Global error type spanning sensor failures, configuration problems and
/// pipeline plumbing.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    #[error("Sensor unavailable: {sensor}: {details}")]
    SensorUnavailable { sensor: String, details: String },

    #[error("Sensor read failed on {sensor}: {details}")]
    SensorRead { sensor: String, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Alert sink error: {0}")]
    Sink(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: String, message: String },

    #[error("Navigator is already running")]
    AlreadyRunning,

    #[error("Navigator is not running")]
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranging_reading_validity_bounds() {
        let now = Instant::now();
        assert!(RangingReading::new(2.0, now).is_valid());
        assert!(RangingReading::new(400.0, now).is_valid());
        assert!(!RangingReading::new(1.9, now).is_valid());
        assert!(!RangingReading::new(400.5, now).is_valid());
        assert!(!RangingReading::new(f32::NAN, now).is_valid());
    }

    #[test]
    fn detection_confidence_is_clamped() {
        let det = Detection::new("person", 1.7, BoundingBox::new(0.4, 0.2, 0.2, 0.5), Instant::now());
        assert_eq!(det.confidence, 1.0);
        assert!((det.bbox.center_x() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn decision_accessors() {
        let d = Decision::Alert {
            level: AlertLevel::Emergency,
            message: "Stop".to_string(),
            distance_cm: 30.0,
            bearing_deg: 0.0,
            confidence: 0.9,
        };
        assert!(d.action_needed());
        assert_eq!(d.priority(), 0);
        assert_eq!(d.suggested_state(), Some(NavState::Emergency));

        assert!(!Decision::NoAction.action_needed());
        assert_eq!(Decision::NoAction.suggested_state(), None);
        assert_eq!(Decision::NoAction.priority(), 4);
    }

    #[test]
    fn alert_levels_map_to_priority_and_state() {
        assert_eq!(AlertLevel::Emergency.priority().value(), 0);
        assert_eq!(AlertLevel::Alert.priority().value(), 1);
        assert_eq!(AlertLevel::Warning.priority().value(), 2);
        assert_eq!(AlertLevel::Warning.suggested_state(), NavState::Scanning);
    }

    #[test]
    fn guidance_action_serializes_with_tag() {
        let action = GuidanceAction::MoveLeft {
            angle_deg: 30.0,
            clear_distance_cm: 300.0,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"action\":\"move_left\""));
        let back: GuidanceAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn turn_toward_picks_side_from_sign() {
        let left = GuidanceAction::turn_toward(-25.0, 200.0);
        assert_eq!(left.tag(), "move_left");
        assert!((left.direction_deg() + 25.0).abs() < 1e-6);

        let right = GuidanceAction::turn_toward(10.0, 200.0);
        assert_eq!(right.tag(), "move_right");
        assert!((right.clear_distance_cm() - 200.0).abs() < 1e-6);
    }

    #[test]
    fn guidance_message_mentions_distance() {
        let g = Guidance {
            action: GuidanceAction::MoveRight {
                angle_deg: 20.0,
                clear_distance_cm: 249.6,
            },
            confidence: 0.8,
            reason: GuidanceReason::ClearPathFound,
        };
        assert!(g.message().contains("250"));
    }

    #[test]
    fn priority_and_side_parse() {
        assert_eq!("HIGH".parse::<AlertPriority>().unwrap(), AlertPriority::High);
        assert!("urgent".parse::<AlertPriority>().is_err());
        assert_eq!("droite".parse::<Side>().unwrap(), Side::Right);
        assert!("up".parse::<Side>().is_err());
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "navsight-runtime::decision",
            EventPayload::StateChanged(StateTransition {
                from: NavState::Scanning,
                to: NavState::Alert,
                at: Utc::now(),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
    }

    #[test]
    fn nav_error_display() {
        let err = NavError::SensorUnavailable {
            sensor: "hc_sr04".to_string(),
            details: "gpio busy".to_string(),
        };
        assert!(err.to_string().contains("hc_sr04"));
        assert!(NavError::InvalidConfig("bins".into()).to_string().contains("Invalid configuration"));
        let panicked = NavError::WorkerPanicked {
            worker: "notification".into(),
            message: "driver crash".into(),
        };
        assert_eq!(panicked.to_string(), "Worker notification panicked: driver crash");
    }
}
