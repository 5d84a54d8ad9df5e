//! `navsight-kernel` – Decision making
//!
//! Everything that turns an occupancy snapshot into something the wearer is
//! told, plus the rules that keep those messages sane.  Nothing here performs
//! I/O or spawns tasks; the runtime drives it.
//!
//! # Modules
//!
//! - [`alert_policy`] – [`AlertPolicy`][alert_policy::AlertPolicy]: distance
//!   thresholds to a prioritised [`Decision`][navsight_types::Decision].
//! - [`guidance`] – [`GuidancePlanner`][guidance::GuidancePlanner]: best
//!   evasive heading when the way ahead is blocked.
//! - [`state_machine`] – [`StateMachine`][state_machine::StateMachine]: the
//!   navigation state and its transition function.
//! - [`announce`] – [`AnnouncementGate`][announce::AnnouncementGate]: minimum
//!   interval and repeat suppression for speech.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: worker heartbeats.

pub mod alert_policy;
pub mod announce;
pub mod guidance;
pub mod state_machine;
pub mod watchdog;

pub use alert_policy::{AlertPolicy, AlertThresholds};
pub use announce::{AnnouncementGate, GateVerdict};
pub use guidance::{GuidanceConfig, GuidancePlanner, ScoreWeights};
pub use state_machine::{StateMachine, StateMachineConfig};
pub use watchdog::{Watchdog, WorkerHealth};
