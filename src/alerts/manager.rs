//! Alert creation and notification policy

use std::sync::Arc;

use parking_lot::RwLock;

use super::model::{Alert, Severity, ValidationError};
use super::store::{AlertStore, StoreError};
use crate::notify::NotificationChannel;

/// Turns observations into persisted alerts and notifies on the important ones
///
/// Every alert is written to the store. Only `medium` and `high` alerts are
/// passed to the active notification channel, and a delivery failure is
/// logged without affecting the stored record.
pub struct AlertManager {
    store: Arc<AlertStore>,
    channel: RwLock<Arc<dyn NotificationChannel>>,
}

impl AlertManager {
    pub fn new(store: Arc<AlertStore>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            store,
            channel: RwLock::new(channel),
        }
    }

    /// Persist an alert and notify if its severity warrants it
    pub async fn raise_alert<S>(&self, message: &str, severity: S) -> Result<Alert, StoreError>
    where
        S: TryInto<Severity>,
        ValidationError: From<S::Error>,
    {
        let severity = severity.try_into().map_err(ValidationError::from)?;
        let alert = self.record(message, severity).await?;
        self.notify(&alert).await;
        Ok(alert)
    }

    /// Persist an alert without notifying
    ///
    /// Pair with [`AlertManager::notify`] when delivery should happen off the
    /// caller's path.
    pub async fn record(&self, message: &str, severity: Severity) -> Result<Alert, StoreError> {
        self.store.insert(message, severity).await
    }

    /// Send a stored alert to the active channel if its severity warrants it.
    /// Delivery failures are logged, never returned.
    pub async fn notify(&self, alert: &Alert) {
        if !alert.severity.notifies() {
            tracing::debug!(
                alert_id = alert.id,
                severity = %alert.severity,
                "Alert below notify level"
            );
            return;
        }

        // Snapshot so a concurrent swap never affects this dispatch
        let channel = Arc::clone(&*self.channel.read());
        if let Err(e) = channel.send(alert).await {
            tracing::error!(
                alert_id = alert.id,
                channel = %channel.name(),
                error = %e,
                "Failed to send notification"
            );
        }
    }

    /// Swap the active channel for subsequent alerts
    pub fn replace_notification_channel(&self, channel: Arc<dyn NotificationChannel>) {
        tracing::info!(channel = %channel.name(), "Notification channel replaced");
        *self.channel.write() = channel;
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertFilter;
    use crate::notify::fanout::tests::RecordingChannel;
    use crate::notify::NotificationFanout;

    async fn manager(channel: Arc<dyn NotificationChannel>) -> AlertManager {
        let store = AlertStore::in_memory().await.unwrap();
        AlertManager::new(Arc::new(store), channel)
    }

    #[tokio::test]
    async fn test_low_severity_is_not_notified() {
        let channel = RecordingChannel::ok("recorder");
        let manager = manager(channel.clone()).await;

        let alert = manager.raise_alert("disk almost full", Severity::Low).await.unwrap();
        assert_eq!(alert.severity, Severity::Low);
        assert_eq!(channel.calls(), 0);

        let stored = manager.store().get(alert.id).await.unwrap();
        assert_eq!(stored, alert);
    }

    #[tokio::test]
    async fn test_medium_and_high_are_notified() {
        let channel = RecordingChannel::ok("recorder");
        let manager = manager(channel.clone()).await;

        manager.raise_alert("cpu", "medium").await.unwrap();
        manager.raise_alert("container down", Severity::High).await.unwrap();
        assert_eq!(channel.calls(), 2);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_alert() {
        let failing = RecordingChannel::failing("broken");
        let fanout = NotificationFanout::new().with_channel(failing.clone());
        let manager = manager(Arc::new(fanout)).await;

        let alert = manager
            .raise_alert("High CPU usage: 95.00%", Severity::High)
            .await
            .unwrap();
        assert_eq!(failing.calls(), 1);

        let all = manager.store().query(&AlertFilter::new()).await.unwrap();
        assert_eq!(all, vec![alert]);
    }

    #[tokio::test]
    async fn test_invalid_severity_persists_nothing() {
        let channel = RecordingChannel::ok("recorder");
        let manager = manager(channel.clone()).await;

        let err = manager.raise_alert("oops", "critical").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(channel.calls(), 0);
        assert!(manager.store().query(&AlertFilter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_channel() {
        let first = RecordingChannel::ok("first");
        let second = RecordingChannel::ok("second");
        let manager = manager(first.clone()).await;

        manager.raise_alert("one", Severity::High).await.unwrap();
        manager.replace_notification_channel(second.clone());
        manager.raise_alert("two", Severity::High).await.unwrap();

        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn test_raise_accepts_every_severity_form() {
        let channel = RecordingChannel::ok("recorder");
        let manager = manager(channel.clone()).await;

        let typed = manager.raise_alert("typed", Severity::Medium).await.unwrap();
        let borrowed = manager.raise_alert("borrowed", "HIGH").await.unwrap();
        let owned = manager
            .raise_alert("owned", String::from("low"))
            .await
            .unwrap();

        assert_eq!(typed.severity, Severity::Medium);
        assert_eq!(borrowed.severity, Severity::High);
        assert_eq!(owned.severity, Severity::Low);
        assert_eq!(channel.calls(), 2);
    }

    #[tokio::test]
    async fn test_record_then_notify() {
        let channel = RecordingChannel::ok("recorder");
        let manager = manager(channel.clone()).await;

        let quiet = manager.record("quiet", Severity::Low).await.unwrap();
        let loud = manager.record("loud", Severity::High).await.unwrap();
        assert_eq!(channel.calls(), 0);
        assert_eq!(manager.store().get(loud.id).await.unwrap(), loud);

        manager.notify(&quiet).await;
        assert_eq!(channel.calls(), 0);
        manager.notify(&loud).await;
        assert_eq!(channel.calls(), 1);
    }
}
