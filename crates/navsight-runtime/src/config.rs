//! [`NavigatorConfig`] – every tunable of the pipeline.
//!
//! Deserialises from a TOML document with the sections `camera`, `ranging`,
//! `fusion`, `thresholds`, `guidance`, `outbound` and `system`.  Every field
//! carries a serde default, so an empty or partial document yields a working
//! configuration.

use std::time::Duration;

use navsight_kernel::{AlertThresholds, GuidanceConfig, ScoreWeights, StateMachineConfig};
use navsight_perception::{FusionConfig, OccupancyConfig};
use navsight_types::{NavError, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub camera: CameraConfig,
    pub ranging: RangingConfig,
    pub fusion: FusionSection,
    pub thresholds: ThresholdConfig,
    pub guidance: GuidanceSection,
    pub outbound: OutboundConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_deg: f32,
    pub frame_height_px: u32,
    pub fps: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 62.2,
            frame_height_px: 720,
            fps: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingConfig {
    pub sample_rate_hz: f32,
    pub min_distance_cm: f32,
    pub max_distance_cm: f32,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 15.0,
            min_distance_cm: navsight_types::RANGING_MIN_CM,
            max_distance_cm: navsight_types::RANGING_MAX_CM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSection {
    pub bins: usize,
    pub ema_alpha: f32,
    pub blend_window_s: f32,
    pub max_age_s: f32,
    pub association_window_ms: u64,
    pub forward_cone_deg: f32,
    /// A ranging reading younger than this updates the model on its own when
    /// no detection batch is waiting.
    pub ranging_fresh_s: f32,
}

impl Default for FusionSection {
    fn default() -> Self {
        Self {
            bins: 13,
            ema_alpha: 0.4,
            blend_window_s: 1.0,
            max_age_s: 2.0,
            association_window_ms: 150,
            forward_cone_deg: 15.0,
            ranging_fresh_s: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub emergency_dist_cm: f32,
    pub alert_dist_cm: f32,
    pub warning_dist_cm: f32,
    /// How long an alert must persist before guidance takes over.
    pub persist_ms: u64,
    pub recovery_time_s: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            emergency_dist_cm: 35.0,
            alert_dist_cm: 100.0,
            warning_dist_cm: 200.0,
            persist_ms: 300,
            recovery_time_s: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceSection {
    pub clear_path_threshold_cm: f32,
    pub critical_dist_cm: f32,
    pub escape_clearance_cm: f32,
    pub min_safe_angle_deg: f32,
    pub preferred_direction: Side,
    pub preferred_turn_deg: f32,
    pub weight_distance: f32,
    pub weight_angle: f32,
    pub weight_extremity: f32,
    pub cache_ttl_ms: u64,
    /// Tick period of the guidance worker.  How often guidance is actually
    /// spoken is governed by the `outbound` announcement gate.
    pub interval_ms: u64,
}

impl Default for GuidanceSection {
    fn default() -> Self {
        let g = GuidanceConfig::default();
        Self {
            clear_path_threshold_cm: g.clear_path_threshold_cm,
            critical_dist_cm: g.critical_dist_cm,
            escape_clearance_cm: g.escape_clearance_cm,
            min_safe_angle_deg: g.min_safe_angle_deg,
            preferred_direction: g.preferred_direction,
            preferred_turn_deg: g.preferred_turn_deg,
            weight_distance: g.weights.distance,
            weight_angle: g.weights.angle,
            weight_extremity: g.weights.extremity,
            cache_ttl_ms: 500,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    pub min_vocal_interval_s: f32,
    pub repeat_window_s: f32,
    pub alert_queue_capacity: usize,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            min_vocal_interval_s: 2.5,
            repeat_window_s: 5.0,
            alert_queue_capacity: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub decision_hz: f32,
    pub telemetry_interval_s: f32,
    pub health_interval_s: f32,
    pub join_timeout_ms: u64,
    pub detection_queue_capacity: usize,
    pub ranging_queue_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            decision_hz: 10.0,
            telemetry_interval_s: 1.0,
            health_interval_s: 5.0,
            join_timeout_ms: 2000,
            detection_queue_capacity: 5,
            ranging_queue_capacity: 10,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation and component views
// ─────────────────────────────────────────────────────────────────────────────

impl NavigatorConfig {
    pub fn validate(&self) -> Result<(), NavError> {
        self.alert_thresholds().validate()?;

        let invalid = |msg: String| Err(NavError::InvalidConfig(msg));
        if self.fusion.bins == 0 {
            return invalid("fusion.bins must be at least 1".into());
        }
        if !(self.camera.fov_deg > 0.0 && self.camera.fov_deg < 360.0) {
            return invalid(format!("camera.fov_deg must be in (0, 360), got {}", self.camera.fov_deg));
        }
        if !(self.fusion.ema_alpha > 0.0 && self.fusion.ema_alpha <= 1.0) {
            return invalid(format!("fusion.ema_alpha must be in (0, 1], got {}", self.fusion.ema_alpha));
        }
        let rates = [
            ("camera.fps", self.camera.fps),
            ("ranging.sample_rate_hz", self.ranging.sample_rate_hz),
            ("system.decision_hz", self.system.decision_hz),
        ];
        for (name, hz) in rates {
            if !(hz.is_finite() && hz > 0.0) {
                return invalid(format!("{name} must be positive, got {hz}"));
            }
        }
        let periods = [
            ("fusion.max_age_s", self.fusion.max_age_s),
            ("fusion.blend_window_s", self.fusion.blend_window_s),
            ("system.telemetry_interval_s", self.system.telemetry_interval_s),
            ("system.health_interval_s", self.system.health_interval_s),
            ("outbound.min_vocal_interval_s", self.outbound.min_vocal_interval_s),
            ("outbound.repeat_window_s", self.outbound.repeat_window_s),
            ("thresholds.recovery_time_s", self.thresholds.recovery_time_s),
        ];
        for (name, s) in periods {
            if !(s.is_finite() && s >= 0.0) {
                return invalid(format!("{name} must be a non-negative number of seconds, got {s}"));
            }
        }
        if self.system.telemetry_interval_s == 0.0 || self.system.health_interval_s == 0.0 {
            return invalid("telemetry and health intervals must be non-zero".into());
        }
        let clear = self.guidance.clear_path_threshold_cm;
        if !(clear.is_finite() && clear > 0.0) {
            return invalid(format!("guidance.clear_path_threshold_cm must be positive, got {clear}"));
        }
        if self.ranging.min_distance_cm >= self.ranging.max_distance_cm {
            return invalid("ranging.min_distance_cm must be below max_distance_cm".into());
        }
        Ok(())
    }

    pub fn occupancy_config(&self) -> OccupancyConfig {
        OccupancyConfig {
            bins: self.fusion.bins,
            fov_deg: self.camera.fov_deg,
            ema_alpha: self.fusion.ema_alpha,
            blend_window: secs(self.fusion.blend_window_s),
            max_age: secs(self.fusion.max_age_s),
            forward_cone_deg: self.fusion.forward_cone_deg,
            ..OccupancyConfig::default()
        }
    }

    pub fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            fov_deg: self.camera.fov_deg,
            frame_height_px: self.camera.frame_height_px,
            association_window: Duration::from_millis(self.fusion.association_window_ms),
            forward_cone_deg: self.fusion.forward_cone_deg,
            ..FusionConfig::default()
        }
    }

    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            emergency_cm: self.thresholds.emergency_dist_cm,
            alert_cm: self.thresholds.alert_dist_cm,
            warning_cm: self.thresholds.warning_dist_cm,
        }
    }

    pub fn state_machine_config(&self) -> StateMachineConfig {
        StateMachineConfig {
            persist: Duration::from_millis(self.thresholds.persist_ms),
            recovery_time: secs(self.thresholds.recovery_time_s),
        }
    }

    pub fn guidance_config(&self) -> GuidanceConfig {
        let g = &self.guidance;
        GuidanceConfig {
            clear_path_threshold_cm: g.clear_path_threshold_cm,
            critical_dist_cm: g.critical_dist_cm,
            escape_clearance_cm: g.escape_clearance_cm,
            min_safe_angle_deg: g.min_safe_angle_deg,
            preferred_direction: g.preferred_direction,
            preferred_turn_deg: g.preferred_turn_deg,
            weights: ScoreWeights {
                distance: g.weight_distance,
                angle: g.weight_angle,
                extremity: g.weight_extremity,
            },
            cache_ttl: Duration::from_millis(g.cache_ttl_ms),
        }
    }

    pub fn frame_period(&self) -> Duration {
        hz_period(self.camera.fps)
    }

    pub fn ranging_period(&self) -> Duration {
        hz_period(self.ranging.sample_rate_hz)
    }

    pub fn decision_period(&self) -> Duration {
        hz_period(self.system.decision_hz)
    }

    pub fn guidance_period(&self) -> Duration {
        Duration::from_millis(self.guidance.interval_ms.max(1))
    }

    pub fn telemetry_period(&self) -> Duration {
        secs(self.system.telemetry_interval_s)
    }

    pub fn health_period(&self) -> Duration {
        secs(self.system.health_interval_s)
    }

    pub fn min_vocal_interval(&self) -> Duration {
        secs(self.outbound.min_vocal_interval_s)
    }

    pub fn repeat_window(&self) -> Duration {
        secs(self.outbound.repeat_window_s)
    }

    pub fn ranging_fresh(&self) -> Duration {
        secs(self.fusion.ranging_fresh_s)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.system.join_timeout_ms)
    }
}

/// Seconds to a duration rounded to the microsecond; invalid input is zero.
fn secs(s: f32) -> Duration {
    if s.is_finite() && s > 0.0 {
        Duration::from_micros((f64::from(s) * 1e6).round() as u64)
    } else {
        Duration::ZERO
    }
}

fn hz_period(hz: f32) -> Duration {
    if hz > 0.0 {
        secs(1.0 / hz)
    } else {
        Duration::from_secs(1)
    }
}
