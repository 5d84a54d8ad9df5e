//! Outbound alert trait.

use async_trait::async_trait;
use navsight_types::{Alert, NavError};
use tracing::info;

/// Speech / haptic collaborator.  Fed in priority order by the notification
/// worker; a failed delivery is logged and the alert is lost.
#[async_trait]
pub trait AlertSink: Send {
    fn id(&self) -> &str;

    async fn deliver(&mut self, alert: &Alert) -> Result<(), NavError>;
}

/// Sink that only writes each alert to the log.
pub struct LogSink {
    id: String,
}

impl LogSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl AlertSink for LogSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&mut self, alert: &Alert) -> Result<(), NavError> {
        info!(
            sink = %self.id,
            priority = alert.priority.value(),
            origin = ?alert.origin,
            "{}",
            alert.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navsight_types::{AlertOrigin, AlertPriority};

    #[tokio::test]
    async fn log_sink_accepts_everything() {
        let mut sink = LogSink::new("log");
        assert_eq!(sink.id(), "log");
        let alert = Alert::new(AlertPriority::High, "Obstacle ahead", AlertOrigin::Decision);
        assert!(sink.deliver(&alert).await.is_ok());
    }
}
