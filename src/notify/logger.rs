use async_trait::async_trait;

use super::{NotificationChannel, NotifyError};
use crate::alerts::Alert;

/// Writes alerts to the process log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        tracing::warn!(
            alert_id = alert.id,
            severity = %alert.severity,
            created_at = %alert.created_at,
            "ALERT: {}",
            alert.message
        );
        Ok(())
    }
}
