//! Egocentric Occupancy Histogram.
//!
//! The camera's horizontal field of view is split into `N` uniformly spaced
//! angular bins.  Each bin tracks the smoothed distance to the nearest
//! obstacle observed in that sector:
//!
//! ```text
//! d_bin = α · d_new + (1 − α) · d_bin        (updated within blend window)
//! d_bin = d_new                              (bin unknown or stale)
//! ```
//!
//! Bins that have not been refreshed for `max_age` are forgotten, so an
//! obstacle that moved away never lingers as "occupied".
//!
//! The model is shared between the ingestion workers (writers) and the
//! decision, guidance and telemetry workers (readers).  All access goes
//! through an internal mutex; readers receive an owned
//! [`OccupancySnapshot`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use navsight_perception::occupancy::{OccupancyConfig, OccupancyModel};
//!
//! let model = OccupancyModel::new(OccupancyConfig {
//!     bins: 5,
//!     fov_deg: 60.0,
//!     ..OccupancyConfig::default()
//! });
//!
//! let now = Instant::now();
//! model.update(0.0, 30.0, 0.9, Some("person"), now);
//!
//! let snap = model.snapshot(now);
//! assert_eq!(snap.min_distance_cm(), Some(30.0));
//! assert_eq!(snap.closest_bearing_deg(), 0.0);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Class label attached to updates that came from the ultrasonic sensor
/// alone.
pub const RANGING_CLASS: &str = "ultrasound";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Construction parameters for [`OccupancyModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyConfig {
    /// Number of angular bins.  Values below 1 are raised to 1.
    pub bins: usize,
    /// Horizontal field of view covered by the bins (degrees).
    pub fov_deg: f32,
    /// EMA weight given to a new observation.
    pub ema_alpha: f32,
    /// A bin updated more recently than this is blended; otherwise the new
    /// observation replaces it outright.
    pub blend_window: Duration,
    /// Bins older than this are reset to unknown before being read.
    pub max_age: Duration,
    /// Half-width of the forward cone in which ranging-only updates are fully
    /// trusted (degrees).
    pub forward_cone_deg: f32,
    /// Confidence assigned to ranging-only updates outside the forward cone.
    pub off_axis_ranging_confidence: f32,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            bins: 13,
            fov_deg: 62.2,
            ema_alpha: 0.4,
            blend_window: Duration::from_secs(1),
            max_age: Duration::from_secs(2),
            forward_cone_deg: 15.0,
            off_axis_ranging_confidence: 0.7,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bin
// ────────────────────────────────────────────────────────────────────────────

/// One angular sector of the field of view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bin {
    /// Smoothed obstacle distance in centimetres; `None` means unknown.
    pub distance_cm: Option<f32>,
    /// Smoothed confidence in `[0, 1]`.
    pub confidence: f32,
    /// Most recent non-empty class label seen in this sector.
    pub object_class: Option<String>,
    /// Time of the last accepted observation.
    pub last_update: Option<Instant>,
}

impl Bin {
    pub fn is_known(&self) -> bool {
        self.distance_cm.is_some()
    }

    fn reset(&mut self) {
        self.distance_cm = None;
        self.confidence = 0.0;
        self.object_class = None;
    }

    fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        match self.last_update {
            Some(t) => now.saturating_duration_since(t) > max_age,
            None => true,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Immutable, decayed, point-in-time copy of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancySnapshot {
    bins: Vec<Bin>,
    bin_centers: Vec<f32>,
    min_distance_cm: Option<f32>,
    closest_bin: Option<usize>,
    timestamp: Instant,
}

impl OccupancySnapshot {
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Bearing of each bin's centre, in degrees.
    pub fn bin_centers(&self) -> &[f32] {
        &self.bin_centers
    }

    /// Smallest known distance across all bins, `None` when every bin is
    /// unknown.
    pub fn min_distance_cm(&self) -> Option<f32> {
        self.min_distance_cm
    }

    /// Index of the bin holding [`min_distance_cm`][Self::min_distance_cm].
    pub fn closest_bin(&self) -> Option<usize> {
        self.closest_bin
    }

    /// Bearing of the closest obstacle, `0.0` when nothing is known.
    pub fn closest_bearing_deg(&self) -> f32 {
        self.closest_bin
            .map(|i| self.bin_centers[i])
            .unwrap_or(0.0)
    }

    /// Smoothed confidence of the closest bin, `0.0` when nothing is known.
    pub fn closest_confidence(&self) -> f32 {
        self.closest_bin
            .map(|i| self.bins[i].confidence)
            .unwrap_or(0.0)
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn bin_distances(&self) -> Vec<Option<f32>> {
        self.bins.iter().map(|b| b.distance_cm).collect()
    }

    /// Per-bin clearance mask.  Unknown bins count as clear.
    pub fn clear_mask(&self, threshold_cm: f32) -> Vec<bool> {
        self.bins
            .iter()
            .map(|b| b.distance_cm.is_none_or(|d| d >= threshold_cm))
            .collect()
    }

    /// Bearings of every bin that is unknown or at least `min_clearance_cm`
    /// away.
    pub fn safe_bearings(&self, min_clearance_cm: f32) -> Vec<f32> {
        self.clear_mask(min_clearance_cm)
            .into_iter()
            .zip(&self.bin_centers)
            .filter_map(|(clear, &c)| clear.then_some(c))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OccupancyModel
// ────────────────────────────────────────────────────────────────────────────

/// Bearing-indexed, decaying obstacle model.
///
/// Safe to share behind an `Arc`: both the blend-update and the
/// decay-then-copy snapshot run under the same lock.
#[derive(Debug)]
pub struct OccupancyModel {
    config: OccupancyConfig,
    bin_centers: Vec<f32>,
    bins: Mutex<Vec<Bin>>,
}

impl OccupancyModel {
    pub fn new(mut config: OccupancyConfig) -> Self {
        config.bins = config.bins.max(1);
        config.ema_alpha = config.ema_alpha.clamp(0.0, 1.0);
        let width = config.fov_deg / config.bins as f32;
        let bin_centers = (0..config.bins)
            .map(|i| -config.fov_deg / 2.0 + width * (i as f32 + 0.5))
            .collect();
        let bins = Mutex::new(vec![Bin::default(); config.bins]);
        Self {
            config,
            bin_centers,
            bins,
        }
    }

    pub fn config(&self) -> &OccupancyConfig {
        &self.config
    }

    pub fn bin_centers(&self) -> &[f32] {
        &self.bin_centers
    }

    /// Map a bearing onto its bin index, `None` outside the field of view.
    pub fn bin_index(&self, bearing_deg: f32) -> Option<usize> {
        let half = self.config.fov_deg / 2.0;
        if !bearing_deg.is_finite() || bearing_deg < -half || bearing_deg > half {
            return None;
        }
        let n = self.config.bins;
        let pos = (bearing_deg + half) / self.config.fov_deg * n as f32;
        Some((pos.floor() as usize).min(n - 1))
    }

    /// Blend one observation into the bin that covers `bearing_deg`.
    ///
    /// Observations outside the field of view, or with a negative or
    /// non-finite distance, are dropped.
    pub fn update(
        &self,
        bearing_deg: f32,
        distance_cm: f32,
        confidence: f32,
        object_class: Option<&str>,
        timestamp: Instant,
    ) {
        let Some(idx) = self.bin_index(bearing_deg) else {
            debug!(bearing_deg, "occupancy update outside field of view; dropped");
            return;
        };
        if !distance_cm.is_finite() || distance_cm < 0.0 {
            debug!(distance_cm, "occupancy update with invalid distance; dropped");
            return;
        }
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut bins = self.lock();
        let bin = &mut bins[idx];
        match (bin.distance_cm, bin.last_update) {
            (Some(prev), Some(last)) => {
                let alpha = if timestamp.saturating_duration_since(last) <= self.config.blend_window {
                    self.config.ema_alpha
                } else {
                    1.0
                };
                bin.distance_cm = Some(alpha * distance_cm + (1.0 - alpha) * prev);
                bin.confidence =
                    (alpha * confidence + (1.0 - alpha) * bin.confidence).clamp(0.0, 1.0);
            }
            _ => {
                bin.distance_cm = Some(distance_cm);
                bin.confidence = confidence;
            }
        }
        bin.last_update = Some(timestamp);
        if let Some(class) = object_class.filter(|c| !c.is_empty()) {
            bin.object_class = Some(class.to_string());
        }
    }

    /// Update the model from the ultrasonic sensor alone.
    ///
    /// Tagged with [`RANGING_CLASS`]; fully trusted inside the forward cone,
    /// reduced confidence elsewhere.
    pub fn update_from_ranging_only(&self, distance_cm: f32, bearing_deg: f32, timestamp: Instant) {
        let confidence = if bearing_deg.abs() <= self.config.forward_cone_deg {
            1.0
        } else {
            self.config.off_axis_ranging_confidence
        };
        self.update(
            bearing_deg,
            distance_cm,
            confidence,
            Some(RANGING_CLASS),
            timestamp,
        );
    }

    /// Forget every bin older than `max_age`.
    pub fn decay(&self, now: Instant) {
        let mut bins = self.lock();
        Self::decay_locked(&mut bins, now, self.config.max_age);
    }

    /// Decay, then return an immutable copy of all bins plus the closest
    /// obstacle.  Ties go to the first bin in order.
    pub fn snapshot(&self, now: Instant) -> OccupancySnapshot {
        let bins = {
            let mut bins = self.lock();
            Self::decay_locked(&mut bins, now, self.config.max_age);
            bins.clone()
        };

        let mut closest: Option<(usize, f32)> = None;
        for (i, bin) in bins.iter().enumerate() {
            if let Some(d) = bin.distance_cm {
                if closest.is_none_or(|(_, best)| d < best) {
                    closest = Some((i, d));
                }
            }
        }

        OccupancySnapshot {
            bins,
            bin_centers: self.bin_centers.clone(),
            min_distance_cm: closest.map(|(_, d)| d),
            closest_bin: closest.map(|(i, _)| i),
            timestamp: now,
        }
    }

    /// Reset every bin to unknown.
    pub fn clear(&self) {
        let mut bins = self.lock();
        for bin in bins.iter_mut() {
            *bin = Bin::default();
        }
    }

    fn decay_locked(bins: &mut [Bin], now: Instant, max_age: Duration) {
        for bin in bins.iter_mut().filter(|b| b.is_known() || b.object_class.is_some()) {
            if bin.is_stale(now, max_age) {
                bin.reset();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Bin>> {
        // A panic while holding the lock leaves bins in a consistent state;
        // keep serving them.
        self.bins.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn five_bin_model() -> OccupancyModel {
        OccupancyModel::new(OccupancyConfig {
            bins: 5,
            fov_deg: 60.0,
            ..OccupancyConfig::default()
        })
    }

    #[test]
    fn bin_centers_are_uniform() {
        let model = five_bin_model();
        assert_eq!(model.bin_centers(), &[-24.0, -12.0, 0.0, 12.0, 24.0]);
    }

    #[test]
    fn bin_index_covers_closed_fov() {
        let model = five_bin_model();
        assert_eq!(model.bin_index(-30.0), Some(0));
        assert_eq!(model.bin_index(-20.0), Some(0));
        assert_eq!(model.bin_index(0.0), Some(2));
        assert_eq!(model.bin_index(20.0), Some(4));
        assert_eq!(model.bin_index(30.0), Some(4));
        assert_eq!(model.bin_index(30.01), None);
        assert_eq!(model.bin_index(-45.0), None);
        assert_eq!(model.bin_index(f32::NAN), None);
    }

    #[test]
    fn update_outside_fov_is_noop() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(10.0, 120.0, 0.5, Some("chair"), now);
        let before = model.snapshot(now);

        for bearing in [-90.0, -30.5, 31.0, 180.0] {
            model.update(bearing, 5.0, 1.0, Some("wall"), now);
        }

        assert_eq!(model.snapshot(now).bins(), before.bins());
    }

    #[test]
    fn invalid_distance_is_dropped() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, -5.0, 0.9, None, now);
        model.update(0.0, f32::INFINITY, 0.9, None, now);
        assert_eq!(model.snapshot(now).min_distance_cm(), None);
    }

    #[test]
    fn ema_blend_lies_between_old_and_new() {
        let model = five_bin_model();
        let t0 = Instant::now();
        model.update(0.0, 100.0, 0.5, None, t0);

        let mut prev = 100.0;
        let mut t = t0;
        for new in [40.0_f32, 180.0, 60.0, 60.0, 300.0] {
            t += Duration::from_millis(200);
            model.update(0.0, new, 0.5, None, t);
            let blended = model.snapshot(t).bins()[2].distance_cm.unwrap();
            let (lo, hi) = if prev < new { (prev, new) } else { (new, prev) };
            assert!(blended >= lo - 1e-4 && blended <= hi + 1e-4);
            prev = blended;
        }
    }

    #[test]
    fn blend_uses_configured_alpha() {
        let model = five_bin_model();
        let t0 = Instant::now();
        model.update(0.0, 100.0, 1.0, None, t0);
        model.update(0.0, 50.0, 0.0, None, t0 + Duration::from_millis(500));

        let snap = model.snapshot(t0 + Duration::from_millis(500));
        let bin = &snap.bins()[2];
        // 0.4 * 50 + 0.6 * 100 = 80
        assert!((bin.distance_cm.unwrap() - 80.0).abs() < 1e-4);
        assert!((bin.confidence - 0.6).abs() < 1e-4);
    }

    #[test]
    fn stale_bin_is_replaced_not_blended() {
        let model = five_bin_model();
        let t0 = Instant::now();
        model.update(0.0, 100.0, 1.0, None, t0);
        let t1 = t0 + Duration::from_millis(1500);
        model.update(0.0, 50.0, 0.3, None, t1);

        let snap = model.snapshot(t1);
        let bin = &snap.bins()[2];
        assert_eq!(bin.distance_cm, Some(50.0));
        assert!((bin.confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn class_label_keeps_latest_non_empty() {
        let model = five_bin_model();
        let t0 = Instant::now();
        model.update(0.0, 100.0, 1.0, Some("person"), t0);
        model.update(0.0, 90.0, 1.0, None, t0);
        model.update(0.0, 90.0, 1.0, Some(""), t0);
        assert_eq!(
            model.snapshot(t0).bins()[2].object_class.as_deref(),
            Some("person")
        );
        model.update(0.0, 90.0, 1.0, Some("bicycle"), t0);
        assert_eq!(
            model.snapshot(t0).bins()[2].object_class.as_deref(),
            Some("bicycle")
        );
    }

    #[test]
    fn decay_resets_old_bins_and_is_idempotent() {
        let model = five_bin_model();
        let t0 = Instant::now();
        model.update(-20.0, 50.0, 0.8, Some("pole"), t0);
        model.update(20.0, 150.0, 0.7, None, t0 + Duration::from_millis(1500));

        let later = t0 + Duration::from_millis(2600);
        let snap = model.snapshot(later);
        assert_eq!(snap.bins()[0], Bin {
            distance_cm: None,
            confidence: 0.0,
            object_class: None,
            last_update: Some(t0),
        });
        assert_eq!(snap.bins()[4].distance_cm, Some(150.0));

        model.decay(later);
        model.decay(later);
        assert_eq!(model.snapshot(later).bins(), snap.bins());

        let much_later = t0 + Duration::from_secs(10);
        assert_eq!(model.snapshot(much_later).min_distance_cm(), None);
    }

    #[test]
    fn snapshot_reports_minimum_and_first_tie() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(-20.0, 50.0, 0.8, None, now);
        model.update(0.0, 30.0, 0.9, None, now);
        model.update(20.0, 150.0, 0.7, None, now);

        let snap = model.snapshot(now);
        assert_eq!(snap.min_distance_cm(), Some(30.0));
        assert_eq!(snap.closest_bearing_deg(), 0.0);
        assert!((snap.closest_confidence() - 0.9).abs() < 1e-6);

        model.update(-12.0, 30.0, 0.5, None, now);
        let snap = model.snapshot(now);
        assert_eq!(snap.closest_bin(), Some(1));
    }

    #[test]
    fn empty_model_has_no_minimum() {
        let snap = five_bin_model().snapshot(Instant::now());
        assert_eq!(snap.min_distance_cm(), None);
        assert_eq!(snap.closest_bearing_deg(), 0.0);
        assert!(snap.clear_mask(150.0).iter().all(|&c| c));
    }

    #[test]
    fn snapshot_is_not_aliased_with_model() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, 80.0, 0.9, Some("door"), now);
        let first = model.snapshot(now);
        let copy = first.clone();

        model.update(0.0, 20.0, 1.0, Some("wall"), now);
        model.update(24.0, 10.0, 1.0, None, now);
        model.clear();

        assert_eq!(first, copy);
        assert_eq!(first.min_distance_cm(), Some(80.0));
    }

    #[test]
    fn ranging_only_trust_depends_on_bearing() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update_from_ranging_only(120.0, 0.0, now);
        model.update_from_ranging_only(120.0, -24.0, now);

        let snap = model.snapshot(now);
        assert_eq!(snap.bins()[2].confidence, 1.0);
        assert!((snap.bins()[0].confidence - 0.7).abs() < 1e-6);
        assert_eq!(snap.bins()[2].object_class.as_deref(), Some(RANGING_CLASS));
    }

    #[test]
    fn safe_bearings_include_unknown_bins() {
        let model = five_bin_model();
        let now = Instant::now();
        model.update(0.0, 60.0, 1.0, None, now);
        model.update(12.0, 400.0, 1.0, None, now);
        let safe = model.snapshot(now).safe_bearings(100.0);
        assert_eq!(safe, vec![-24.0, -12.0, 12.0, 24.0]);
    }
}
