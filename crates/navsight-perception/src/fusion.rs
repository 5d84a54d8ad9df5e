//! Detection / Ranging Fusion.
//!
//! Combines camera [`Detection`]s with the most recent ultrasonic
//! [`RangingReading`] into [`OccupancyUpdate`]s for the
//! [`OccupancyModel`][crate::occupancy::OccupancyModel].
//!
//! The two sensors complement each other:
//! - **Camera** – wide field of view and object classes, but distance can
//!   only be guessed from the apparent size of the bounding box.
//! - **Ultrasound** – accurate range, but only straight ahead and without any
//!   notion of what the obstacle is.
//!
//! A detection is *associated* with a reading when both were captured within
//! the association window.  Associated detections inside the forward cone
//! borrow the ultrasonic distance at full trust; associated detections
//! outside it fall back to a size-based estimate at reduced trust:
//!
//! ```text
//! |bearing| ≤ cone  →  distance = ranging,         confidence × 1.0
//! |bearing| > cone  →  distance = bbox estimate,   confidence × off_axis_trust
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use navsight_perception::fusion::{DetectionFuser, FusionConfig};
//! use navsight_types::{BoundingBox, Detection, RangingReading};
//!
//! let fuser = DetectionFuser::new(FusionConfig::default());
//! let now = Instant::now();
//!
//! let person = Detection::new("person", 0.9, BoundingBox::new(0.45, 0.1, 0.1, 0.8), now);
//! let reading = RangingReading::new(85.0, now);
//!
//! let updates = fuser.fuse(&[person], Some(&reading));
//! assert_eq!(updates.len(), 1);
//! assert!((updates[0].distance_cm - 85.0).abs() < 1e-5);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use navsight_types::{BoundingBox, Detection, RangingReading};
use tracing::debug;

use crate::occupancy::OccupancyModel;

/// Distance assumed when nothing better is known (cm).
pub const DEFAULT_DISTANCE_CM: f32 = 200.0;

/// Size-based estimates are clamped to this range (cm).
const ESTIMATE_MIN_CM: f32 = 50.0;
const ESTIMATE_MAX_CM: f32 = 500.0;

/// Apparent height in pixels of each known class at one metre.
static REFERENCE_HEIGHTS_PX: LazyLock<HashMap<&'static str, f32>> = LazyLock::new(|| {
    HashMap::from([
        ("person", 200.0),
        ("car", 150.0),
        ("bicycle", 120.0),
        ("motorcycle", 130.0),
        ("bus", 180.0),
        ("truck", 170.0),
    ])
});

// ────────────────────────────────────────────────────────────────────────────
// Output type
// ────────────────────────────────────────────────────────────────────────────

/// A single observation ready to be blended into the occupancy model.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyUpdate {
    pub bearing_deg: f32,
    pub distance_cm: f32,
    pub confidence: f32,
    pub class_name: String,
    pub timestamp: Instant,
}

impl OccupancyUpdate {
    /// Blend this observation into `model`.
    pub fn apply_to(&self, model: &OccupancyModel) {
        model.update(
            self.bearing_deg,
            self.distance_cm,
            self.confidence,
            Some(&self.class_name),
            self.timestamp,
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry helpers
// ────────────────────────────────────────────────────────────────────────────

/// Signed bearing of a bounding box centre across a horizontal `fov_deg`.
pub fn bearing_from_bbox(bbox: &BoundingBox, fov_deg: f32) -> f32 {
    (bbox.center_x() - 0.5) * fov_deg
}

/// Guess an obstacle's distance from the height of its bounding box.
///
/// Unknown classes and degenerate boxes yield [`DEFAULT_DISTANCE_CM`].
pub fn estimate_distance_from_bbox(class_name: &str, bbox_height: f32, frame_height_px: u32) -> f32 {
    let Some(&reference) = REFERENCE_HEIGHTS_PX.get(class_name) else {
        return DEFAULT_DISTANCE_CM;
    };
    let apparent_px = bbox_height * frame_height_px as f32;
    if !apparent_px.is_finite() || apparent_px <= 0.0 {
        return DEFAULT_DISTANCE_CM;
    }
    (reference / apparent_px * 100.0).clamp(ESTIMATE_MIN_CM, ESTIMATE_MAX_CM)
}

// ────────────────────────────────────────────────────────────────────────────
// DetectionFuser
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Horizontal field of view used to derive missing bearings (degrees).
    pub fov_deg: f32,
    /// Frame height in pixels, used by the size-based distance estimate.
    pub frame_height_px: u32,
    /// Maximum capture-time gap between a detection and a reading for them
    /// to be associated.
    pub association_window: Duration,
    /// Half-width of the cone covered by the ultrasonic sensor (degrees).
    pub forward_cone_deg: f32,
    /// Confidence multiplier for associated detections outside the cone.
    pub off_axis_trust: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            fov_deg: 62.2,
            frame_height_px: 720,
            association_window: Duration::from_millis(150),
            forward_cone_deg: 15.0,
            off_axis_trust: 0.7,
        }
    }
}

/// Turns detection batches plus the latest ranging reading into occupancy
/// updates.  Stateless apart from its configuration.
#[derive(Debug, Clone)]
pub struct DetectionFuser {
    config: FusionConfig,
}

impl DetectionFuser {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse one batch of detections.
    ///
    /// Detections without a bearing get one derived from their bounding box.
    /// Detections with a non-finite bearing are dropped.
    pub fn fuse(&self, detections: &[Detection], reading: Option<&RangingReading>) -> Vec<OccupancyUpdate> {
        detections
            .iter()
            .filter_map(|det| self.fuse_one(det, reading))
            .collect()
    }

    fn fuse_one(&self, det: &Detection, reading: Option<&RangingReading>) -> Option<OccupancyUpdate> {
        let bearing = det
            .bearing_deg
            .unwrap_or_else(|| bearing_from_bbox(&det.bbox, self.config.fov_deg));
        if !bearing.is_finite() {
            debug!(class = %det.class_name, "detection with non-finite bearing; dropped");
            return None;
        }

        let associated = reading.filter(|r| {
            abs_diff(r.timestamp, det.timestamp) <= self.config.association_window
        });

        let (distance_cm, trust) = match associated {
            Some(r) if bearing.abs() < self.config.forward_cone_deg => (r.distance_cm, 1.0),
            Some(_) => (
                estimate_distance_from_bbox(&det.class_name, det.bbox.h, self.config.frame_height_px),
                self.config.off_axis_trust,
            ),
            None => (
                det.distance_cm.unwrap_or_else(|| {
                    estimate_distance_from_bbox(&det.class_name, det.bbox.h, self.config.frame_height_px)
                }),
                1.0,
            ),
        };

        Some(OccupancyUpdate {
            bearing_deg: bearing,
            distance_cm,
            confidence: (det.confidence * trust).clamp(0.0, 1.0),
            class_name: det.class_name.clone(),
            timestamp: det.timestamp,
        })
    }
}

fn abs_diff(a: Instant, b: Instant) -> Duration {
    if a >= b { a - b } else { b - a }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occupancy::{OccupancyConfig, OccupancyModel};

    fn det(class: &str, center_x: f32, h: f32, at: Instant) -> Detection {
        Detection::new(class, 0.8, BoundingBox::new(center_x - 0.05, 0.1, 0.1, h), at)
    }

    #[test]
    fn bearing_from_bbox_is_signed() {
        let fov = 60.0;
        assert!((bearing_from_bbox(&BoundingBox::new(0.45, 0.0, 0.1, 0.1), fov)).abs() < 1e-5);
        assert!((bearing_from_bbox(&BoundingBox::new(0.0, 0.0, 0.0, 0.1), fov) + 30.0).abs() < 1e-5);
        assert!((bearing_from_bbox(&BoundingBox::new(0.7, 0.0, 0.1, 0.1), fov) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn distance_estimate_uses_reference_heights() {
        // 200 px reference, box is 0.5 * 400 = 200 px → 100 cm.
        assert!((estimate_distance_from_bbox("person", 0.5, 400) - 100.0).abs() < 1e-4);
        // Tiny box → far away, clamped.
        assert_eq!(estimate_distance_from_bbox("car", 0.01, 720), 500.0);
        // Huge box → very close, clamped.
        assert_eq!(estimate_distance_from_bbox("bus", 1.0, 10_000), 50.0);
    }

    #[test]
    fn distance_estimate_falls_back_to_default() {
        assert_eq!(estimate_distance_from_bbox("chair", 0.5, 720), DEFAULT_DISTANCE_CM);
        assert_eq!(estimate_distance_from_bbox("person", 0.0, 720), DEFAULT_DISTANCE_CM);
    }

    #[test]
    fn forward_detection_borrows_ranging_distance() {
        let fuser = DetectionFuser::new(FusionConfig::default());
        let now = Instant::now();
        let reading = RangingReading::new(72.0, now + Duration::from_millis(40));

        let updates = fuser.fuse(&[det("person", 0.5, 0.6, now)], Some(&reading));
        assert_eq!(updates.len(), 1);
        assert!((updates[0].distance_cm - 72.0).abs() < 1e-5);
        assert!((updates[0].confidence - 0.8).abs() < 1e-5);
    }

    #[test]
    fn off_axis_detection_uses_size_estimate_with_reduced_trust() {
        let fuser = DetectionFuser::new(FusionConfig {
            fov_deg: 60.0,
            frame_height_px: 400,
            ..FusionConfig::default()
        });
        let now = Instant::now();
        let reading = RangingReading::new(72.0, now);

        // centre_x 0.9 → bearing +24°, outside the 15° cone.
        let updates = fuser.fuse(&[det("person", 0.9, 0.5, now)], Some(&reading));
        assert!((updates[0].bearing_deg - 24.0).abs() < 1e-4);
        assert!((updates[0].distance_cm - 100.0).abs() < 1e-3);
        assert!((updates[0].confidence - 0.56).abs() < 1e-5);
    }

    #[test]
    fn stale_reading_is_not_associated() {
        let fuser = DetectionFuser::new(FusionConfig::default());
        let now = Instant::now();
        let reading = RangingReading::new(72.0, now);
        let late = now + Duration::from_millis(400);

        let d = det("chair", 0.5, 0.3, late).with_distance(130.0);
        let updates = fuser.fuse(&[d], Some(&reading));
        assert!((updates[0].distance_cm - 130.0).abs() < 1e-5);
        assert!((updates[0].confidence - 0.8).abs() < 1e-5);
    }

    #[test]
    fn vision_only_defaults_when_no_estimate() {
        let fuser = DetectionFuser::new(FusionConfig::default());
        let updates = fuser.fuse(&[det("dog", 0.5, 0.3, Instant::now())], None);
        assert_eq!(updates[0].distance_cm, DEFAULT_DISTANCE_CM);
    }

    #[test]
    fn explicit_bearing_is_preserved() {
        let fuser = DetectionFuser::new(FusionConfig::default());
        let d = det("person", 0.5, 0.3, Instant::now()).with_bearing(-12.5);
        let updates = fuser.fuse(&[d], None);
        assert_eq!(updates[0].bearing_deg, -12.5);

        let bad = det("person", 0.5, 0.3, Instant::now()).with_bearing(f32::NAN);
        assert!(fuser.fuse(&[bad], None).is_empty());
    }

    #[test]
    fn apply_to_feeds_model() {
        let model = OccupancyModel::new(OccupancyConfig::default());
        let fuser = DetectionFuser::new(FusionConfig::default());
        let now = Instant::now();
        let reading = RangingReading::new(64.0, now);

        for update in fuser.fuse(&[det("person", 0.5, 0.6, now)], Some(&reading)) {
            update.apply_to(&model);
        }

        let snap = model.snapshot(now);
        assert_eq!(snap.min_distance_cm(), Some(64.0));
        let closest = snap.closest_bin().unwrap();
        assert_eq!(snap.bins()[closest].object_class.as_deref(), Some("person"));
    }
}
