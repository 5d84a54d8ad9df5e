//! `navsight-middleware` – The Nervous System
//!
//! Moves data between pipeline workers without caring about its meaning.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.  Carries state changes, guidance, alerts, telemetry
//!   and worker faults to any number of subscribers.
//! - [`fresh_queue`] – Bounded channel that drops its *oldest* item when
//!   full, so consumers always see the freshest sensor data.
//! - [`alert_queue`] – Bounded priority channel for outbound alerts, lowest
//!   priority number first, FIFO within a priority.

pub mod alert_queue;
pub mod bus;
pub mod fresh_queue;

pub use alert_queue::{AlertQueue, PushOutcome};
pub use bus::{EventBus, Topic, TopicReceiver};
pub use fresh_queue::FreshQueue;
