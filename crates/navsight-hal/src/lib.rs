//! `navsight-hal` – Collaborator boundary
//!
//! The navigation core never touches a camera, a serial port or a speech
//! engine directly.  It talks to three narrow traits; drivers for real
//! hardware implement them out of tree, and [`sim`] provides in-process
//! stand-ins for tests and demos.
//!
//! - [`DetectionSource`] – batches of object detections.
//! - [`RangingSource`] – ultrasonic distance readings.
//! - [`AlertSink`] – speech / haptic output.

pub mod sim;
pub mod sink;
pub mod source;

pub use sink::{AlertSink, LogSink};
pub use source::{DetectionSource, RangingSource};
