//! `navsight-perception` – Egocentric world model.
//!
//! Turns noisy detections and ultrasonic ranges into a compact,
//! bearing-indexed picture of what is in front of the wearer.
//!
//! # Modules
//!
//! - [`occupancy`] – [`OccupancyModel`][occupancy::OccupancyModel]: a fixed
//!   set of angular bins across the camera field of view, each holding an
//!   exponentially smoothed obstacle distance that decays when it is not
//!   refreshed.  Consumers only ever see immutable
//!   [`OccupancySnapshot`][occupancy::OccupancySnapshot]s.
//! - [`fusion`] – [`DetectionFuser`][fusion::DetectionFuser]: associates
//!   camera detections with the latest ultrasonic reading and turns them into
//!   [`OccupancyUpdate`][fusion::OccupancyUpdate]s for the model.

pub mod fusion;
pub mod occupancy;

pub use fusion::{DetectionFuser, FusionConfig, OccupancyUpdate};
pub use occupancy::{Bin, OccupancyConfig, OccupancyModel, OccupancySnapshot};
