//! [`AlertPolicy`] – turns an occupancy snapshot into a [`Decision`].
//!
//! The policy compares the snapshot's global minimum distance against three
//! ascending thresholds:
//!
//! | Minimum distance | Level | Priority | Suggested state |
//! |------------------|-------|----------|-----------------|
//! | `< emergency_cm` | [`AlertLevel::Emergency`] | 0 | `Emergency` |
//! | `< alert_cm`     | [`AlertLevel::Alert`]     | 1 | `Alert` |
//! | `< warning_cm`   | [`AlertLevel::Warning`]   | 2 | `Scanning` |
//! | otherwise / unknown | – | – | [`Decision::NoAction`] |
//!
//! The policy holds no mutable state. Rate limiting of the resulting speech
//! is the orchestrator's job.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use navsight_kernel::alert_policy::{AlertPolicy, AlertThresholds};
//! use navsight_perception::{OccupancyConfig, OccupancyModel};
//! use navsight_types::{AlertLevel, NavState};
//!
//! let policy = AlertPolicy::new(AlertThresholds::default()).unwrap();
//! let model = OccupancyModel::new(OccupancyConfig::default());
//! let now = Instant::now();
//! model.update(0.0, 30.0, 0.9, Some("person"), now);
//!
//! let decision = policy.evaluate(&model.snapshot(now), NavState::Scanning);
//! assert_eq!(decision.level(), Some(AlertLevel::Emergency));
//! assert_eq!(decision.priority(), 0);
//! ```

use navsight_perception::OccupancySnapshot;
use navsight_types::{AlertLevel, Decision, NavError, NavState};
use tracing::debug;

/// Distance thresholds in centimetres. Must be strictly ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub emergency_cm: f32,
    pub alert_cm: f32,
    pub warning_cm: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            emergency_cm: 35.0,
            alert_cm: 100.0,
            warning_cm: 200.0,
        }
    }
}

impl AlertThresholds {
    pub fn validate(&self) -> Result<(), NavError> {
        let Self {
            emergency_cm,
            alert_cm,
            warning_cm,
        } = *self;
        if !(emergency_cm > 0.0 && emergency_cm < alert_cm && alert_cm < warning_cm) {
            return Err(NavError::InvalidConfig(format!(
                "alert thresholds must satisfy 0 < emergency < alert < warning \
                 (got {emergency_cm} / {alert_cm} / {warning_cm})"
            )));
        }
        Ok(())
    }

    /// Level for an obstacle at `distance_cm`, `None` beyond the warning
    /// distance.
    pub fn classify(&self, distance_cm: f32) -> Option<AlertLevel> {
        if distance_cm < self.emergency_cm {
            Some(AlertLevel::Emergency)
        } else if distance_cm < self.alert_cm {
            Some(AlertLevel::Alert)
        } else if distance_cm < self.warning_cm {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }
}

/// Stateless distance-threshold policy.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    thresholds: AlertThresholds,
}

impl AlertPolicy {
    /// Build a policy, rejecting thresholds that are not strictly ascending.
    pub fn new(thresholds: AlertThresholds) -> Result<Self, NavError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Evaluate `snapshot` while the pipeline is in `current_state`.
    ///
    /// Nothing is announced while the pipeline is [`NavState::Idle`].
    pub fn evaluate(&self, snapshot: &OccupancySnapshot, current_state: NavState) -> Decision {
        if current_state == NavState::Idle {
            return Decision::NoAction;
        }
        let Some(distance_cm) = snapshot.min_distance_cm() else {
            return Decision::NoAction;
        };
        let Some(level) = self.thresholds.classify(distance_cm) else {
            return Decision::NoAction;
        };

        let bearing_deg = snapshot.closest_bearing_deg();
        let decision = Decision::Alert {
            level,
            message: alert_message(level, distance_cm, bearing_deg),
            distance_cm,
            bearing_deg,
            confidence: snapshot.closest_confidence(),
        };
        debug!(
            ?level,
            distance_cm,
            bearing_deg,
            state = %current_state,
            "alert policy decision"
        );
        decision
    }
}

fn alert_message(level: AlertLevel, distance_cm: f32, bearing_deg: f32) -> String {
    let cm = distance_cm.round() as i32;
    match level {
        AlertLevel::Emergency => format!("Stop! Obstacle very close, {cm} centimetres"),
        AlertLevel::Alert => format!(
            "Obstacle {} at {cm} centimetres",
            direction_phrase(bearing_deg)
        ),
        AlertLevel::Warning => format!("Caution, obstacle at {cm} centimetres"),
    }
}

fn direction_phrase(bearing_deg: f32) -> &'static str {
    if bearing_deg < -10.0 {
        "on the left"
    } else if bearing_deg > 10.0 {
        "on the right"
    } else {
        "ahead"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navsight_perception::{OccupancyConfig, OccupancyModel};
    use std::time::Instant;

    fn five_bin_model() -> OccupancyModel {
        OccupancyModel::new(OccupancyConfig {
            bins: 5,
            fov_deg: 60.0,
            ..OccupancyConfig::default()
        })
    }

    fn policy() -> AlertPolicy {
        AlertPolicy::new(AlertThresholds::default()).unwrap()
    }

    #[test]
    fn emergency_below_first_threshold() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, 30.0, 0.9, Some("person"), now);

        let decision = policy().evaluate(&model.snapshot(now), NavState::Scanning);
        assert_eq!(decision.level(), Some(AlertLevel::Emergency));
        assert_eq!(decision.priority(), 0);
        assert_eq!(decision.suggested_state(), Some(NavState::Emergency));
        assert!(decision.message().contains("30"));
        assert!((decision.confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn alert_band() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(-24.0, 80.0, 0.6, None, now);

        let decision = policy().evaluate(&model.snapshot(now), NavState::Scanning);
        assert_eq!(decision.level(), Some(AlertLevel::Alert));
        assert_eq!(decision.priority(), 1);
        assert!(decision.message().contains("left"));
    }

    #[test]
    fn warning_band_suggests_scanning() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, 150.0, 0.5, None, now);

        let decision = policy().evaluate(&model.snapshot(now), NavState::Scanning);
        assert_eq!(decision.priority(), 2);
        assert_eq!(decision.suggested_state(), Some(NavState::Scanning));
    }

    #[test]
    fn nothing_close_is_no_action() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, 250.0, 0.5, None, now);

        let decision = policy().evaluate(&model.snapshot(now), NavState::Scanning);
        assert_eq!(decision, Decision::NoAction);
        assert!(!decision.action_needed());
    }

    #[test]
    fn closest_of_several_obstacles_decides() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(-20.0, 50.0, 0.8, None, now);
        model.update(0.0, 30.0, 0.9, Some("person"), now);
        model.update(20.0, 150.0, 0.7, None, now);

        let policy = AlertPolicy::new(AlertThresholds {
            emergency_cm: 40.0,
            alert_cm: 100.0,
            warning_cm: 200.0,
        })
        .unwrap();
        let decision = policy.evaluate(&model.snapshot(now), NavState::Scanning);
        assert!(decision.action_needed());
        assert_eq!(decision.priority(), 0);
        assert_eq!(decision.level(), Some(AlertLevel::Emergency));
        assert_eq!(decision.suggested_state(), Some(NavState::Emergency));
        assert!(decision.message().contains("30"));

        let far = five_bin_model();
        for bearing in [-24.0, -12.0, 0.0, 12.0, 24.0] {
            far.update(bearing, 200.0, 0.8, None, now);
        }
        let decision = policy.evaluate(&far.snapshot(now), NavState::Scanning);
        assert!(!decision.action_needed());
        assert_eq!(decision, Decision::NoAction);
    }

    #[test]
    fn empty_model_is_no_action() {
        let model = five_bin_model();
        let decision = policy().evaluate(&model.snapshot(Instant::now()), NavState::Scanning);
        assert_eq!(decision, Decision::NoAction);
    }

    #[test]
    fn idle_pipeline_never_alerts() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, 10.0, 1.0, None, now);
        let decision = policy().evaluate(&model.snapshot(now), NavState::Idle);
        assert_eq!(decision, Decision::NoAction);
    }

    #[test]
    fn closer_obstacle_never_lowers_urgency() {
        let p = policy();
        let now = Instant::now();
        let mut last_priority = u8::MAX;
        for d in [390.0_f32, 250.0, 199.0, 150.0, 99.0, 60.0, 34.0, 5.0] {
            let model = five_bin_model();
            model.update(0.0, d, 0.8, None, now);
            let priority = p.evaluate(&model.snapshot(now), NavState::Scanning).priority();
            assert!(priority <= last_priority, "priority rose at {d} cm");
            last_priority = priority;
        }
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let err = AlertPolicy::new(AlertThresholds {
            emergency_cm: 120.0,
            alert_cm: 100.0,
            warning_cm: 200.0,
        })
        .unwrap_err();
        assert!(matches!(err, NavError::InvalidConfig(_)));
    }

    #[test]
    fn message_rounds_distance() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, 29.6, 1.0, None, now);
        let decision = policy().evaluate(&model.snapshot(now), NavState::Alert);
        assert!(decision.message().contains("30 centimetres"));
    }
}
