//! [`GuidancePlanner`] – proposes an evasive heading when the way ahead is
//! blocked.
//!
//! # Algorithm
//!
//! 1. A bin is *clear* when it is unknown or its distance is at least the
//!    clear-path threshold.  If every bin is clear the wearer may continue.
//! 2. If the closest obstacle is nearer than the critical distance the planner
//!    only looks for an escape: the bin with the largest known distance, taken
//!    if it offers more than the escape clearance, otherwise stop.
//! 3. Otherwise every clear bin is scored on clearance, closeness to the
//!    preferred turn and avoidance of extreme angles.  The best bin becomes a
//!    slight correction, a slow-down or a full turn depending on its angle.
//!
//! [`GuidancePlanner::plan`] is pure; [`GuidancePlanner::get_guidance`] caches
//! the result for a short period so repeated queries inside one cycle are
//! cheap and stable.

use std::time::{Duration, Instant};

use navsight_perception::OccupancySnapshot;
use navsight_types::{
    Guidance, GuidanceAction, GuidanceReason, RANGING_MAX_CM, Side,
};
use tracing::{debug, info};

/// Angular scale used by the angle and extremity score terms (degrees).
const ANGLE_SCALE_DEG: f32 = 60.0;

/// Relative weight of each scoring term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub distance: f32,
    pub angle: f32,
    pub extremity: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            distance: 0.5,
            angle: 0.3,
            extremity: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuidanceConfig {
    /// A bin at least this far away (cm) is a clear path.
    pub clear_path_threshold_cm: f32,
    /// Below this minimum distance (cm) only an escape is considered.
    pub critical_dist_cm: f32,
    /// Clearance (cm) an escape direction must exceed.
    pub escape_clearance_cm: f32,
    /// Paths within this angle of straight ahead become slight corrections.
    pub min_safe_angle_deg: f32,
    pub preferred_direction: Side,
    /// Magnitude of the preferred turn (degrees).
    pub preferred_turn_deg: f32,
    pub weights: ScoreWeights,
    pub cache_ttl: Duration,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            clear_path_threshold_cm: 150.0,
            critical_dist_cm: 50.0,
            escape_clearance_cm: 80.0,
            min_safe_angle_deg: 20.0,
            preferred_direction: Side::Right,
            preferred_turn_deg: 30.0,
            weights: ScoreWeights::default(),
            cache_ttl: Duration::from_millis(500),
        }
    }
}

impl GuidanceConfig {
    /// Signed bearing of the preferred turn.
    pub fn preferred_bearing_deg(&self) -> f32 {
        match self.preferred_direction {
            Side::Left => -self.preferred_turn_deg,
            Side::Right => self.preferred_turn_deg,
        }
    }
}

/// Best-scoring clear sector.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    bearing_deg: f32,
    clearance_cm: f32,
    score: f32,
}

pub struct GuidancePlanner {
    config: GuidanceConfig,
    cache: Option<(Instant, Guidance)>,
}

impl GuidancePlanner {
    pub fn new(config: GuidanceConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    /// Compute guidance for `snapshot` without touching the cache.
    pub fn plan(&self, snapshot: &OccupancySnapshot) -> Guidance {
        let threshold = self.config.clear_path_threshold_cm;
        let clear = snapshot.clear_mask(threshold);

        let Some(min_distance) = snapshot.min_distance_cm() else {
            return path_clear(threshold);
        };
        if clear.iter().all(|&c| c) {
            return path_clear(threshold);
        }

        if min_distance < self.config.critical_dist_cm {
            return self.escape(snapshot);
        }

        let Some(best) = self.best_candidate(snapshot, &clear) else {
            return Guidance {
                action: GuidanceAction::Stop {
                    clear_distance_cm: 0.0,
                },
                confidence: 0.8,
                reason: GuidanceReason::NoClearPath,
            };
        };

        let confidence = (best.score * 1.2).clamp(0.0, 0.95);
        let (action, reason) = if best.bearing_deg.abs() < self.config.min_safe_angle_deg {
            if best.clearance_cm > min_distance * 1.5 {
                let side = Side::of_bearing(best.bearing_deg);
                let reason = match side {
                    Side::Left => GuidanceReason::SlightlyLeft,
                    Side::Right => GuidanceReason::SlightlyRight,
                };
                (
                    GuidanceAction::MoveSlightly {
                        side,
                        angle_deg: best.bearing_deg.abs(),
                        clear_distance_cm: best.clearance_cm,
                    },
                    reason,
                )
            } else {
                (
                    GuidanceAction::SlowDown {
                        clear_distance_cm: best.clearance_cm,
                    },
                    GuidanceReason::NarrowPath,
                )
            }
        } else {
            (
                GuidanceAction::turn_toward(best.bearing_deg, best.clearance_cm),
                GuidanceReason::ClearPathFound,
            )
        };

        Guidance {
            action,
            confidence,
            reason,
        }
    }

    /// Cached variant of [`plan`][Self::plan]: a result younger than the
    /// cache TTL is returned as-is.
    pub fn get_guidance(&mut self, snapshot: &OccupancySnapshot, now: Instant) -> Guidance {
        if let Some((at, guidance)) = self.cache
            && now.saturating_duration_since(at) < self.config.cache_ttl
        {
            return guidance;
        }
        let guidance = self.plan(snapshot);
        debug!(action = guidance.action.tag(), reason = ?guidance.reason, "guidance planned");
        self.cache = Some((now, guidance));
        guidance
    }

    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// One-word action for quick haptic feedback:
    /// `stop`, `left`, `right`, `slow` or `continue`.
    pub fn suggest_immediate_action(
        &mut self,
        snapshot: &OccupancySnapshot,
        now: Instant,
    ) -> &'static str {
        match self.get_guidance(snapshot, now).action {
            GuidanceAction::Stop { .. } => "stop",
            GuidanceAction::MoveLeft { .. } => "left",
            GuidanceAction::MoveRight { .. } => "right",
            GuidanceAction::SlowDown { .. } => "slow",
            GuidanceAction::MoveSlightly { .. } | GuidanceAction::Continue { .. } => "continue",
        }
    }

    /// Bearings of every bin that is unknown or at least `min_clearance_cm`
    /// away.
    pub fn safe_directions(snapshot: &OccupancySnapshot, min_clearance_cm: f32) -> Vec<f32> {
        snapshot.safe_bearings(min_clearance_cm)
    }

    /// Adjust preferences at runtime.  The clear-path threshold is floored at
    /// 50 cm and the safe angle clamped to `[5, 45]` degrees.  Any change
    /// invalidates the cache.
    pub fn update_preferences(
        &mut self,
        clear_path_threshold_cm: Option<f32>,
        min_safe_angle_deg: Option<f32>,
        preferred_direction: Option<Side>,
    ) {
        if let Some(t) = clear_path_threshold_cm {
            self.config.clear_path_threshold_cm = t.max(50.0);
        }
        if let Some(a) = min_safe_angle_deg {
            self.config.min_safe_angle_deg = a.clamp(5.0, 45.0);
        }
        if let Some(side) = preferred_direction {
            self.config.preferred_direction = side;
        }
        self.cache = None;
        info!(
            threshold_cm = self.config.clear_path_threshold_cm,
            safe_angle_deg = self.config.min_safe_angle_deg,
            preferred = self.config.preferred_direction.as_str(),
            "guidance preferences updated"
        );
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn escape(&self, snapshot: &OccupancySnapshot) -> Guidance {
        let mut best: Option<(f32, f32)> = None;
        for (bin, &center) in snapshot.bins().iter().zip(snapshot.bin_centers()) {
            if let Some(d) = bin.distance_cm
                && best.is_none_or(|(max, _)| d > max)
            {
                best = Some((d, center));
            }
        }
        let (max_distance, bearing) = best.unwrap_or((0.0, 0.0));

        if max_distance > self.config.escape_clearance_cm {
            Guidance {
                action: GuidanceAction::turn_toward(bearing, max_distance),
                confidence: 0.7,
                reason: GuidanceReason::CriticalEscape,
            }
        } else {
            Guidance {
                action: GuidanceAction::Stop {
                    clear_distance_cm: max_distance,
                },
                confidence: 0.9,
                reason: GuidanceReason::CriticalNoEscape,
            }
        }
    }

    fn best_candidate(&self, snapshot: &OccupancySnapshot, clear: &[bool]) -> Option<Candidate> {
        let threshold = self.config.clear_path_threshold_cm;
        let preferred = self.config.preferred_bearing_deg();
        let w = self.config.weights;

        let mut best: Option<Candidate> = None;
        for ((bin, &bearing_deg), &is_clear) in
            snapshot.bins().iter().zip(snapshot.bin_centers()).zip(clear)
        {
            if !is_clear {
                continue;
            }
            // Unknown sectors are reported at the sensor's maximum range.
            let clearance_cm = bin.distance_cm.unwrap_or(RANGING_MAX_CM);
            let distance_score = (clearance_cm / threshold).min(1.0);
            let angle_score = 1.0 - (bearing_deg - preferred).abs() / ANGLE_SCALE_DEG;
            let extremity_score = 1.0 - bearing_deg.abs() / ANGLE_SCALE_DEG;
            let score = w.distance * distance_score + w.angle * angle_score + w.extremity * extremity_score;

            if best.is_none_or(|b| score > b.score) {
                best = Some(Candidate {
                    bearing_deg,
                    clearance_cm,
                    score,
                });
            }
        }
        best
    }
}

fn path_clear(threshold_cm: f32) -> Guidance {
    Guidance {
        action: GuidanceAction::Continue {
            clear_distance_cm: threshold_cm,
        },
        confidence: 1.0,
        reason: GuidanceReason::PathClear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navsight_perception::{OccupancyConfig, OccupancyModel};

    /// Five bins across 60°: centres at -24, -12, 0, 12, 24.
    fn model() -> OccupancyModel {
        OccupancyModel::new(OccupancyConfig {
            bins: 5,
            fov_deg: 60.0,
            ..OccupancyConfig::default()
        })
    }

    fn planner() -> GuidancePlanner {
        GuidancePlanner::new(GuidanceConfig::default())
    }

    #[test]
    fn all_clear_continues_with_full_confidence() {
        let m = model();
        let now = Instant::now();
        for b in [-24.0, -12.0, 0.0, 12.0, 24.0] {
            m.update(b, 300.0, 0.9, None, now);
        }
        let g = planner().plan(&m.snapshot(now));
        assert_eq!(g.action.tag(), "continue");
        assert_eq!(g.confidence, 1.0);
        assert_eq!(g.reason, GuidanceReason::PathClear);
    }

    #[test]
    fn empty_model_continues() {
        let g = planner().plan(&model().snapshot(Instant::now()));
        assert_eq!(g.reason, GuidanceReason::PathClear);
    }

    #[test]
    fn blocked_ahead_with_clear_side_turns_instead_of_stopping() {
        let m = model();
        let now = Instant::now();
        m.update(0.0, 80.0, 0.9, Some("person"), now);
        m.update(-30.0, 300.0, 0.9, None, now);

        let g = planner().plan(&m.snapshot(now));
        assert!(
            matches!(g.action, GuidanceAction::MoveLeft { .. } | GuidanceAction::MoveRight { .. }),
            "unexpected action {:?}",
            g.action
        );
        assert_eq!(g.reason, GuidanceReason::ClearPathFound);
        assert!(g.confidence > 0.0 && g.confidence <= 0.95);
    }

    #[test]
    fn preferred_side_wins_between_equal_paths() {
        let m = model();
        let now = Instant::now();
        for b in [-12.0, 0.0, 12.0] {
            m.update(b, 80.0, 0.9, None, now);
        }
        m.update(-24.0, 300.0, 0.9, None, now);
        m.update(24.0, 300.0, 0.9, None, now);

        let mut p = planner();
        assert_eq!(p.plan(&m.snapshot(now)).action.tag(), "move_right");

        p.update_preferences(None, None, Some(Side::Left));
        assert_eq!(p.plan(&m.snapshot(now)).action.tag(), "move_left");
    }

    #[test]
    fn only_known_side_bin_is_clear() {
        let m = model();
        let now = Instant::now();
        for b in [-24.0, -12.0, 0.0, 12.0] {
            m.update(b, 90.0, 0.9, None, now);
        }
        m.update(24.0, 200.0, 0.9, None, now);

        let g = planner().plan(&m.snapshot(now));
        assert_eq!(
            g.action,
            GuidanceAction::MoveRight {
                angle_deg: 24.0,
                clear_distance_cm: 200.0
            }
        );
    }

    #[test]
    fn near_straight_path_with_room_is_slight_correction() {
        let m = model();
        let now = Instant::now();
        for b in [-24.0, -12.0, 0.0, 24.0] {
            m.update(b, 70.0, 0.9, None, now);
        }
        m.update(12.0, 300.0, 0.9, None, now);

        let g = planner().plan(&m.snapshot(now));
        assert_eq!(g.reason, GuidanceReason::SlightlyRight);
        assert_eq!(g.action.direction_deg(), 12.0);
    }

    #[test]
    fn near_straight_path_without_room_slows_down() {
        let m = model();
        let now = Instant::now();
        for b in [-24.0, -12.0, 0.0, 24.0] {
            m.update(b, 120.0, 0.9, None, now);
        }
        m.update(12.0, 160.0, 0.9, None, now);

        let g = planner().plan(&m.snapshot(now));
        assert_eq!(g.action.tag(), "slow_down");
        assert_eq!(g.reason, GuidanceReason::NarrowPath);
    }

    #[test]
    fn no_clear_bin_stops() {
        let m = model();
        let now = Instant::now();
        for b in [-24.0, -12.0, 0.0, 12.0, 24.0] {
            m.update(b, 100.0, 0.9, None, now);
        }
        let g = planner().plan(&m.snapshot(now));
        assert_eq!(g.action.tag(), "stop");
        assert_eq!(g.confidence, 0.8);
        assert_eq!(g.reason, GuidanceReason::NoClearPath);
    }

    #[test]
    fn critical_obstacle_escapes_toward_farthest_bin() {
        let m = model();
        let now = Instant::now();
        m.update(0.0, 30.0, 0.9, None, now);
        m.update(-24.0, 120.0, 0.9, None, now);

        let g = planner().plan(&m.snapshot(now));
        assert_eq!(g.reason, GuidanceReason::CriticalEscape);
        assert_eq!(g.confidence, 0.7);
        assert_eq!(
            g.action,
            GuidanceAction::MoveLeft {
                angle_deg: 24.0,
                clear_distance_cm: 120.0
            }
        );
    }

    #[test]
    fn critical_obstacle_without_escape_stops() {
        let m = model();
        let now = Instant::now();
        m.update(0.0, 30.0, 0.9, None, now);
        m.update(12.0, 60.0, 0.9, None, now);

        let g = planner().plan(&m.snapshot(now));
        assert_eq!(g.reason, GuidanceReason::CriticalNoEscape);
        assert_eq!(g.confidence, 0.9);
        assert_eq!(g.action.clear_distance_cm(), 60.0);
    }

    #[test]
    fn cache_holds_result_within_ttl() {
        let m = model();
        let now = Instant::now();
        let mut p = planner();

        let first = p.get_guidance(&m.snapshot(now), now);
        assert_eq!(first.reason, GuidanceReason::PathClear);

        for b in [-24.0, -12.0, 0.0, 12.0, 24.0] {
            m.update(b, 100.0, 0.9, None, now);
        }
        let cached = p.get_guidance(&m.snapshot(now), now + Duration::from_millis(100));
        assert_eq!(cached, first);

        let fresh = p.get_guidance(&m.snapshot(now), now + Duration::from_millis(600));
        assert_eq!(fresh.reason, GuidanceReason::NoClearPath);
    }

    #[test]
    fn immediate_action_tags() {
        let m = model();
        let now = Instant::now();
        let mut p = planner();
        assert_eq!(p.suggest_immediate_action(&m.snapshot(now), now), "continue");

        p.invalidate_cache();
        m.update(0.0, 20.0, 0.9, None, now);
        assert_eq!(p.suggest_immediate_action(&m.snapshot(now), now), "stop");
    }

    #[test]
    fn safe_directions_include_unknown_bins() {
        let m = model();
        let now = Instant::now();
        m.update(0.0, 40.0, 0.9, None, now);
        let safe = GuidancePlanner::safe_directions(&m.snapshot(now), 100.0);
        assert_eq!(safe, vec![-24.0, -12.0, 12.0, 24.0]);
    }

    #[test]
    fn preferences_are_clamped() {
        let mut p = planner();
        p.update_preferences(Some(10.0), Some(90.0), None);
        assert_eq!(p.config().clear_path_threshold_cm, 50.0);
        assert_eq!(p.config().min_safe_angle_deg, 45.0);
        p.update_preferences(None, Some(1.0), None);
        assert_eq!(p.config().min_safe_angle_deg, 5.0);
    }
}
