//! [`StateMachine`] – the navigation state and its transition function.
//!
//! Decisions from the alert policy drive the machine:
//!
//! ```text
//!   Idle ──start──▶ Scanning ──alert/emergency──▶ Alert ──persist──▶ Guidance
//!                      ▲                            │ ▲                 │
//!                      │                            ▼ │                 │
//!                      │                         Emergency ◀────────────┘
//!                      │                            │
//!                      └──── quiet for recovery ── Recover ◀── warning / no action
//! ```
//!
//! `Idle` is only entered at construction and through
//! [`StateMachine::shutdown`].  A transition is recorded only when the state
//! actually changes; the last [`HISTORY_LEN`] transitions are kept.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use navsight_types::{AlertLevel, Decision, NavState, StateTransition};
use tracing::info;

/// Number of transitions retained in the history.
pub const HISTORY_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct StateMachineConfig {
    /// How long an `Alert` must persist before guidance takes over.
    pub persist: Duration,
    /// Quiet time in `Recover` before returning to `Scanning`.
    pub recovery_time: Duration,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            persist: Duration::from_millis(300),
            recovery_time: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug)]
pub struct StateMachine {
    config: StateMachineConfig,
    state: NavState,
    entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// A new machine in [`NavState::Idle`].
    pub fn new(config: StateMachineConfig, now: Instant) -> Self {
        Self {
            config,
            state: NavState::Idle,
            entered_at: now,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    /// Time spent in the current state.
    pub fn time_in_state(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_at)
    }

    /// Oldest-first transition history.
    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    /// Leave `Idle` and start scanning.  No-op in any other state.
    pub fn start(&mut self, now: Instant) -> Option<StateTransition> {
        if self.state != NavState::Idle {
            return None;
        }
        self.transition(NavState::Scanning, now)
    }

    /// Force the machine back to `Idle`.
    pub fn shutdown(&mut self, now: Instant) -> Option<StateTransition> {
        self.transition(NavState::Idle, now)
    }

    /// Feed one decision.  Returns the transition if the state changed.
    pub fn apply(&mut self, decision: &Decision, now: Instant) -> Option<StateTransition> {
        let next = self.next_state(decision.level(), now);
        self.transition(next, now)
    }

    /// Pure transition function.
    pub fn next_state(&self, level: Option<AlertLevel>, now: Instant) -> NavState {
        use AlertLevel::{Alert, Emergency};

        let elapsed = self.time_in_state(now);
        match (self.state, level) {
            (NavState::Idle, _) => NavState::Idle,

            (_, Some(Emergency)) => NavState::Emergency,

            (NavState::Scanning, Some(Alert)) => NavState::Alert,
            (NavState::Scanning, _) => NavState::Scanning,

            (NavState::Alert, Some(Alert)) if elapsed >= self.config.persist => NavState::Guidance,
            (NavState::Alert, Some(Alert)) => NavState::Alert,
            (NavState::Guidance, Some(Alert)) => NavState::Guidance,
            (NavState::Emergency, Some(Alert)) => NavState::Alert,
            (NavState::Recover, Some(Alert)) => NavState::Alert,

            (NavState::Recover, _) if elapsed >= self.config.recovery_time => NavState::Scanning,
            (NavState::Recover, _) => NavState::Recover,

            (NavState::Alert | NavState::Guidance | NavState::Emergency, _) => NavState::Recover,
        }
    }

    fn transition(&mut self, to: NavState, now: Instant) -> Option<StateTransition> {
        if to == self.state {
            return None;
        }
        let t = StateTransition {
            from: self.state,
            to,
            at: Utc::now(),
        };
        info!(from = %t.from, to = %t.to, "navigation state changed");
        self.state = to;
        self.entered_at = now;
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(t);
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(level: AlertLevel) -> Decision {
        Decision::Alert {
            level,
            message: "obstacle".into(),
            distance_cm: 50.0,
            bearing_deg: 0.0,
            confidence: 0.8,
        }
    }

    fn started(now: Instant) -> StateMachine {
        let mut sm = StateMachine::new(StateMachineConfig::default(), now);
        sm.start(now);
        sm
    }

    #[test]
    fn starts_idle_then_scans() {
        let now = Instant::now();
        let mut sm = StateMachine::new(StateMachineConfig::default(), now);
        assert_eq!(sm.state(), NavState::Idle);
        let t = sm.start(now).unwrap();
        assert_eq!((t.from, t.to), (NavState::Idle, NavState::Scanning));
        assert!(sm.start(now).is_none());
    }

    #[test]
    fn idle_ignores_decisions() {
        let now = Instant::now();
        let mut sm = StateMachine::new(StateMachineConfig::default(), now);
        assert!(sm.apply(&alert(AlertLevel::Emergency), now).is_none());
        assert_eq!(sm.state(), NavState::Idle);
    }

    #[test]
    fn scanning_escalates_directly() {
        let now = Instant::now();
        let mut sm = started(now);
        sm.apply(&alert(AlertLevel::Emergency), now);
        assert_eq!(sm.state(), NavState::Emergency);

        let mut sm = started(now);
        sm.apply(&alert(AlertLevel::Alert), now);
        assert_eq!(sm.state(), NavState::Alert);
    }

    #[test]
    fn warning_keeps_scanning() {
        let now = Instant::now();
        let mut sm = started(now);
        assert!(sm.apply(&alert(AlertLevel::Warning), now).is_none());
        assert!(sm.apply(&Decision::NoAction, now).is_none());
        assert_eq!(sm.state(), NavState::Scanning);
    }

    #[test]
    fn persistent_alert_hands_over_to_guidance() {
        let now = Instant::now();
        let mut sm = started(now);
        sm.apply(&alert(AlertLevel::Alert), now);
        sm.apply(&alert(AlertLevel::Alert), now + Duration::from_millis(100));
        assert_eq!(sm.state(), NavState::Alert);
        sm.apply(&alert(AlertLevel::Alert), now + Duration::from_millis(300));
        assert_eq!(sm.state(), NavState::Guidance);
        sm.apply(&alert(AlertLevel::Alert), now + Duration::from_millis(400));
        assert_eq!(sm.state(), NavState::Guidance);
    }

    #[test]
    fn emergency_overrides_guidance_and_deescalates_to_alert() {
        let now = Instant::now();
        let mut sm = started(now);
        sm.apply(&alert(AlertLevel::Alert), now);
        sm.apply(&alert(AlertLevel::Alert), now + Duration::from_millis(300));
        sm.apply(&alert(AlertLevel::Emergency), now + Duration::from_millis(400));
        assert_eq!(sm.state(), NavState::Emergency);
        sm.apply(&alert(AlertLevel::Alert), now + Duration::from_millis(500));
        assert_eq!(sm.state(), NavState::Alert);
    }

    #[test]
    fn recovery_returns_to_scanning_after_quiet_period() {
        let now = Instant::now();
        let mut sm = started(now);
        sm.apply(&alert(AlertLevel::Emergency), now);
        sm.apply(&Decision::NoAction, now + Duration::from_millis(100));
        assert_eq!(sm.state(), NavState::Recover);

        sm.apply(&Decision::NoAction, now + Duration::from_millis(1000));
        assert_eq!(sm.state(), NavState::Recover);
        sm.apply(&alert(AlertLevel::Warning), now + Duration::from_millis(1700));
        assert_eq!(sm.state(), NavState::Scanning);
    }

    #[test]
    fn recover_reescalates() {
        let now = Instant::now();
        let mut sm = started(now);
        sm.apply(&alert(AlertLevel::Alert), now);
        sm.apply(&Decision::NoAction, now);
        assert_eq!(sm.state(), NavState::Recover);
        sm.apply(&alert(AlertLevel::Alert), now);
        assert_eq!(sm.state(), NavState::Alert);
    }

    #[test]
    fn shutdown_forces_idle() {
        let now = Instant::now();
        let mut sm = started(now);
        sm.apply(&alert(AlertLevel::Emergency), now);
        let t = sm.shutdown(now).unwrap();
        assert_eq!((t.from, t.to), (NavState::Emergency, NavState::Idle));
        assert!(sm.shutdown(now).is_none());
    }

    #[test]
    fn history_is_bounded() {
        let now = Instant::now();
        let mut sm = started(now);
        for _ in 0..40 {
            sm.apply(&alert(AlertLevel::Emergency), now);
            sm.apply(&alert(AlertLevel::Alert), now);
        }
        assert_eq!(sm.history().count(), HISTORY_LEN);
        let last = sm.history().last().unwrap();
        assert_eq!(last.to, NavState::Alert);
    }
}
