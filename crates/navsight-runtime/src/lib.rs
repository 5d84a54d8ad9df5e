//! `navsight-runtime` – the navigation pipeline.
//!
//! Wires sensors, perception, policy and speech output into one supervised
//! set of Tokio workers.
//!
//! # Modules
//!
//! - [`navigator`] – [`Navigator`]: lifecycle (`start`/`stop`), the eight
//!   pipeline workers, forced announcements and runtime threshold changes.
//! - [`config`] – [`NavigatorConfig`]: every tunable, serde-loadable, with
//!   validation and conversion into the component configs.
//! - [`metrics`] – [`PipelineMetrics`]: lock-free counters and rolling
//!   stage latencies.
//! - [`telemetry`] – [`init_tracing`]: the global `tracing` subscriber with
//!   an optional OTLP exporter.

pub mod config;
pub mod metrics;
pub mod navigator;
pub mod telemetry;

pub use config::NavigatorConfig;
pub use metrics::{PerformanceSummary, PipelineMetrics, Stage};
pub use navigator::{Navigator, ThresholdUpdate};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
