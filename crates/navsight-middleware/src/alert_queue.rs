//! [`AlertQueue`] – bounded priority channel for outbound alerts.
//!
//! Alerts leave in priority order (lowest number first) and FIFO within a
//! priority.  When the queue is full, a new alert that is at least as urgent
//! as the least urgent queued alert evicts it (oldest first); otherwise the
//! new alert is rejected.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use navsight_types::{Alert, AlertPriority};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

const LANES: usize = AlertPriority::Info as usize + 1;

/// Result of [`AlertQueue::push`].
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting a less urgent alert.
    Evicted(Alert),
    /// Queue full of more urgent alerts.
    Rejected(Alert),
}

#[derive(Debug)]
struct Lanes {
    lanes: [VecDeque<Alert>; LANES],
    len: usize,
}

impl Lanes {
    fn least_urgent_lane(&self) -> Option<usize> {
        (0..LANES).rev().find(|&i| !self.lanes[i].is_empty())
    }
}

#[derive(Debug)]
pub struct AlertQueue {
    capacity: usize,
    inner: Mutex<Lanes>,
    notify: Notify,
    dropped: AtomicU64,
}

impl AlertQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Lanes {
                lanes: Default::default(),
                len: 0,
            }),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, alert: Alert) -> PushOutcome {
        let lane = alert.priority.value() as usize;
        let outcome = {
            let mut inner = self.lock();
            if inner.len < self.capacity {
                inner.lanes[lane].push_back(alert);
                inner.len += 1;
                PushOutcome::Queued
            } else {
                match inner.least_urgent_lane() {
                    Some(worst) if lane <= worst => {
                        let evicted = inner.lanes[worst].pop_front();
                        inner.lanes[lane].push_back(alert);
                        match evicted {
                            Some(e) => PushOutcome::Evicted(e),
                            None => PushOutcome::Queued,
                        }
                    }
                    _ => PushOutcome::Rejected(alert),
                }
            }
        };
        match &outcome {
            PushOutcome::Queued => {}
            PushOutcome::Evicted(a) | PushOutcome::Rejected(a) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(priority = a.priority.value(), message = %a.message, "alert dropped; queue full");
            }
        }
        if !matches!(outcome, PushOutcome::Rejected(_)) {
            self.notify.notify_one();
        }
        outcome
    }

    /// Most urgent alert, if any.
    pub fn try_pop(&self) -> Option<Alert> {
        let mut inner = self.lock();
        let lane = (0..LANES).find(|&i| !inner.lanes[i].is_empty())?;
        let alert = inner.lanes[lane].pop_front();
        if alert.is_some() {
            inner.len -= 1;
        }
        alert
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Alert> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(alert) = self.try_pop() {
                return Some(alert);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Remove everything, most urgent first.
    pub fn drain(&self) -> Vec<Alert> {
        let mut inner = self.lock();
        inner.len = 0;
        inner.lanes.iter_mut().flat_map(|l| l.drain(..)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Alerts evicted or rejected since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Lanes> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
