//! Inbound sensor traits.

use async_trait::async_trait;
use navsight_types::{Detection, NavError, RangingReading};

/// Produces batches of object detections, one batch per processed frame.
///
/// # Contract
///
/// * `open` is called once before the first `next_batch`; an error there
///   aborts pipeline start-up.
/// * `next_batch` may return an empty batch when the frame contained nothing.
///   Detections should carry their capture timestamp so they can be
///   associated with ranging readings.
#[async_trait]
pub trait DetectionSource: Send {
    /// Stable identifier, e.g. `"front_camera"`.
    fn id(&self) -> &str;

    async fn open(&mut self) -> Result<(), NavError>;

    async fn next_batch(&mut self) -> Result<Vec<Detection>, NavError>;
}

/// Produces ultrasonic distance readings.
///
/// `read` should return the previous known value when a fresh reading times
/// out; only a sensor that has never produced a value returns an error.
#[async_trait]
pub trait RangingSource: Send {
    fn id(&self) -> &str;

    async fn open(&mut self) -> Result<(), NavError>;

    async fn read(&mut self) -> Result<RangingReading, NavError>;
}
