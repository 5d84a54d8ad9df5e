//! [`AnnouncementGate`] – rate limiter and repeat suppressor for speech.
//!
//! Two rules apply, in order:
//!
//! 1. At most one announcement per `min_interval`.
//! 2. A message identical to one admitted within `repeat_window` is dropped.
//!
//! Only admitted messages are recorded; a rejected message does not push the
//! window forward.
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use navsight_kernel::announce::{AnnouncementGate, GateVerdict};
//!
//! let mut gate = AnnouncementGate::new(Duration::from_millis(2500), Duration::from_secs(5));
//! let t0 = Instant::now();
//!
//! assert_eq!(gate.check("Obstacle ahead", t0), GateVerdict::Admitted);
//! assert_eq!(gate.check("Stop!", t0 + Duration::from_secs(1)), GateVerdict::TooSoon);
//! assert_eq!(gate.check("Obstacle ahead", t0 + Duration::from_secs(3)), GateVerdict::Repeated);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of [`AnnouncementGate::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Admitted,
    /// Inside the minimum interval since the last admitted message.
    TooSoon,
    /// Same text already admitted inside the repeat window.
    Repeated,
}

impl GateVerdict {
    pub fn is_admitted(self) -> bool {
        self == GateVerdict::Admitted
    }
}

pub struct AnnouncementGate {
    min_interval: Duration,
    repeat_window: Duration,
    last_admitted: Option<Instant>,
    /// Admitted messages younger than `repeat_window`, oldest first.
    recent: VecDeque<(Instant, String)>,
}

impl AnnouncementGate {
    pub fn new(min_interval: Duration, repeat_window: Duration) -> Self {
        Self {
            min_interval,
            repeat_window,
            last_admitted: None,
            recent: VecDeque::new(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    /// Evaluate `message` at `now` without recording anything.
    pub fn peek(&self, message: &str, now: Instant) -> GateVerdict {
        if let Some(last) = self.last_admitted
            && now.saturating_duration_since(last) < self.min_interval
        {
            return GateVerdict::TooSoon;
        }
        let repeated = self.recent.iter().any(|(at, text)| {
            text == message && now.saturating_duration_since(*at) < self.repeat_window
        });
        if repeated {
            GateVerdict::Repeated
        } else {
            GateVerdict::Admitted
        }
    }

    /// Evaluate `message` at `now`, recording it when admitted.
    pub fn check(&mut self, message: &str, now: Instant) -> GateVerdict {
        let verdict = self.peek(message, now);
        if verdict.is_admitted() {
            self.record(message, now);
        }
        verdict
    }

    /// Mark `message` as spoken at `now` and drop repeat entries that have
    /// aged out.  Forced announcements never reach the gate.
    fn record(&mut self, message: &str, now: Instant) {
        while let Some((at, _)) = self.recent.front() {
            if now.saturating_duration_since(*at) >= self.repeat_window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.last_admitted = Some(now);
        self.recent.push_back((now, message.to_string()));
    }

    pub fn reset(&mut self) {
        self.last_admitted = None;
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AnnouncementGate {
        AnnouncementGate::new(Duration::from_millis(2500), Duration::from_secs(5))
    }

    #[test]
    fn first_message_is_admitted() {
        let mut g = gate();
        assert!(g.check("hello", Instant::now()).is_admitted());
    }

    #[test]
    fn two_messages_one_second_apart_yield_one_announcement() {
        let mut g = gate();
        let t0 = Instant::now();
        let admitted = [
            g.check("Obstacle at 80 centimetres", t0),
            g.check("Obstacle at 70 centimetres", t0 + Duration::from_secs(1)),
        ]
        .iter()
        .filter(|v| v.is_admitted())
        .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn different_message_after_interval_is_admitted() {
        let mut g = gate();
        let t0 = Instant::now();
        g.check("a", t0);
        assert_eq!(g.check("b", t0 + Duration::from_millis(2500)), GateVerdict::Admitted);
    }

    #[test]
    fn identical_message_suppressed_until_window_passes() {
        let mut g = gate();
        let t0 = Instant::now();
        g.check("a", t0);
        assert_eq!(g.check("a", t0 + Duration::from_secs(3)), GateVerdict::Repeated);
        assert_eq!(g.check("a", t0 + Duration::from_secs(5)), GateVerdict::Admitted);
    }

    #[test]
    fn rejected_message_does_not_extend_interval() {
        let mut g = gate();
        let t0 = Instant::now();
        g.check("a", t0);
        g.check("b", t0 + Duration::from_secs(2));
        assert!(g.check("b", t0 + Duration::from_millis(2600)).is_admitted());
    }

    #[test]
    fn admission_restarts_the_interval() {
        let mut g = gate();
        let t0 = Instant::now();
        g.record("spoken", t0);
        assert_eq!(g.peek("other", t0 + Duration::from_secs(1)), GateVerdict::TooSoon);
        assert_eq!(g.peek("spoken", t0 + Duration::from_secs(3)), GateVerdict::Repeated);
        assert!(g.check("other", t0 + Duration::from_secs(3)).is_admitted());
    }

    #[test]
    fn reset_clears_state() {
        let mut g = gate();
        let t0 = Instant::now();
        g.check("a", t0);
        g.reset();
        assert!(g.check("a", t0).is_admitted());
    }
}
