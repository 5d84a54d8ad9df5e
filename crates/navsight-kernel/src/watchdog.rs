//! [`Watchdog`] – pipeline worker health monitor.
//!
//! Every worker calls [`Watchdog::heartbeat`] once per iteration.  The health
//! monitor calls [`Watchdog::check_all`] periodically and reports any worker
//! whose last heartbeat is older than its deadline as *stalled*.
//!
//! The `*_at` variants take an explicit clock reading so callers holding a
//! single `Instant` for a whole cycle stay consistent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health state reported for a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    /// Heartbeat received within the deadline.
    Healthy,
    /// No heartbeat within the deadline.
    Stalled,
}

struct WorkerEntry {
    last_heartbeat: Instant,
    deadline: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats from pipeline workers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use navsight_kernel::watchdog::{Watchdog, WorkerHealth};
///
/// let mut wd = Watchdog::new();
/// wd.register("fusion", Duration::from_secs(1));
/// wd.heartbeat("fusion");
///
/// assert_eq!(wd.health("fusion"), WorkerHealth::Healthy);
/// ```
#[derive(Default)]
pub struct Watchdog {
    workers: HashMap<String, WorkerEntry>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker` with a heartbeat `deadline`, starting healthy.
    /// Re-registering resets the deadline.
    pub fn register(&mut self, worker: &str, deadline: Duration) {
        self.register_at(worker, deadline, Instant::now());
    }

    pub fn register_at(&mut self, worker: &str, deadline: Duration, now: Instant) {
        self.workers.insert(
            worker.to_string(),
            WorkerEntry {
                last_heartbeat: now,
                deadline,
            },
        );
    }

    /// Record a heartbeat.  Unknown workers are ignored.
    pub fn heartbeat(&mut self, worker: &str) {
        self.heartbeat_at(worker, Instant::now());
    }

    pub fn heartbeat_at(&mut self, worker: &str, now: Instant) {
        if let Some(entry) = self.workers.get_mut(worker) {
            entry.last_heartbeat = now;
        }
    }

    /// Time since the last heartbeat of `worker`, `None` if unregistered.
    pub fn silence_at(&self, worker: &str, now: Instant) -> Option<Duration> {
        self.workers
            .get(worker)
            .map(|e| now.saturating_duration_since(e.last_heartbeat))
    }

    /// Unknown workers report [`WorkerHealth::Stalled`].
    pub fn health(&self, worker: &str) -> WorkerHealth {
        self.health_at(worker, Instant::now())
    }

    pub fn health_at(&self, worker: &str, now: Instant) -> WorkerHealth {
        match self.workers.get(worker) {
            Some(e) if now.saturating_duration_since(e.last_heartbeat) <= e.deadline => {
                WorkerHealth::Healthy
            }
            _ => WorkerHealth::Stalled,
        }
    }

    /// Names of all stalled workers, sorted.
    pub fn check_all(&self) -> Vec<String> {
        self.check_all_at(Instant::now())
    }

    pub fn check_all_at(&self, now: Instant) -> Vec<String> {
        let mut stalled: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_heartbeat) > e.deadline)
            .map(|(id, _)| id.clone())
            .collect();
        stalled.sort();
        stalled
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
