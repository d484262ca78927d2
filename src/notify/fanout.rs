//! Fan-out delivery to every registered channel

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChannelFailure, NotificationChannel, NotifyError, DEFAULT_NOTIFY_TIMEOUT};
use crate::alerts::Alert;

/// Delivers each alert to all registered channels
///
/// Channels are invoked one after another in registration order. Each attempt
/// is bounded by `timeout`, and a failure or timeout on one channel never
/// stops delivery to the rest. Failures are collected and returned together
/// once every channel has been attempted.
pub struct NotificationFanout {
    channels: Vec<Arc<dyn NotificationChannel>>,
    timeout: Duration,
}

impl NotificationFanout {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            timeout,
        }
    }

    /// Append a channel to the delivery set
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        tracing::info!(channel = %channel.name(), "Registered notification channel");
        self.channels.push(channel);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register(channel);
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Send an alert to every channel
    pub async fn dispatch(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut failures = Vec::new();

        for channel in &self.channels {
            let error = match tokio::time::timeout(self.timeout, channel.send(alert)).await {
                Ok(Ok(())) => {
                    tracing::debug!(
                        alert_id = alert.id,
                        channel = %channel.name(),
                        "Notification delivered"
                    );
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => NotifyError::Timeout(self.timeout),
            };

            tracing::warn!(
                alert_id = alert.id,
                channel = %channel.name(),
                error = %error,
                "Notification failed"
            );
            failures.push(ChannelFailure {
                channel: channel.name().to_string(),
                error,
            });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Aggregate(failures))
        }
    }
}

impl Default for NotificationFanout {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for NotificationFanout {
    fn name(&self) -> &str {
        "composite"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.dispatch(alert).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerts::{AlertStatus, Severity};
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel that records calls and optionally fails or stalls
    pub(crate) struct RecordingChannel {
        name: String,
        pub calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
        log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl RecordingChannel {
        pub(crate) fn ok(name: &str) -> Arc<Self> {
            Arc::new(Self::build(name, false, None, None))
        }

        pub(crate) fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self::build(name, true, None, None))
        }

        fn build(
            name: &str,
            fail: bool,
            delay: Option<Duration>,
            log: Option<Arc<Mutex<Vec<String>>>>,
        ) -> Self {
            Self {
                name: name.to_string(),
                calls: AtomicUsize::new(0),
                fail,
                delay,
                log,
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.lock().push(self.name.clone());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                Err(NotifyError::Webhook(format!("{} is down", self.name)))
            } else {
                Ok(())
            }
        }
    }

    pub(crate) fn sample_alert(severity: Severity) -> Alert {
        let now = Utc::now();
        Alert {
            id: 1,
            message: "High Memory usage: 91.20%".to_string(),
            severity,
            status: AlertStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_empty_fanout_succeeds() {
        let fanout = NotificationFanout::new();
        assert!(fanout.is_empty());
        assert!(fanout.dispatch(&sample_alert(Severity::High)).await.is_ok());
    }

    #[tokio::test]
    async fn test_partial_failure_reaches_every_channel() {
        let first = RecordingChannel::ok("first");
        let second = RecordingChannel::failing("second");
        let third = RecordingChannel::ok("third");

        let fanout = NotificationFanout::new()
            .with_channel(first.clone())
            .with_channel(second.clone())
            .with_channel(third.clone());

        let err = fanout
            .dispatch(&sample_alert(Severity::High))
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].channel, "second");
        assert!(failures[0].error.to_string().contains("second is down"));

        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        assert_eq!(third.calls(), 1);
    }

    #[tokio::test]
    async fn test_invocation_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = NotificationFanout::new();
        for name in ["email", "slack", "log"] {
            fanout.register(Arc::new(RecordingChannel::build(
                name,
                false,
                None,
                Some(Arc::clone(&log)),
            )));
        }

        assert_eq!(fanout.channel_names(), vec!["email", "slack", "log"]);
        fanout.dispatch(&sample_alert(Severity::Medium)).await.unwrap();
        assert_eq!(*log.lock(), vec!["email", "slack", "log"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_channel_times_out_without_hiding_others() {
        let slow = Arc::new(RecordingChannel::build(
            "slow",
            false,
            Some(Duration::from_secs(60)),
            None,
        ));
        let failing = RecordingChannel::failing("fast");

        let fanout = NotificationFanout::with_timeout(Duration::from_secs(1))
            .with_channel(slow.clone())
            .with_channel(failing.clone());

        let err = fanout
            .dispatch(&sample_alert(Severity::High))
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].channel, "slow");
        assert!(matches!(failures[0].error, NotifyError::Timeout(_)));
        assert_eq!(failures[1].channel, "fast");
        assert_eq!(failing.calls(), 1);
    }

    #[tokio::test]
    async fn test_fanout_nests_as_channel() {
        let inner_ok = RecordingChannel::ok("inner");
        let inner = NotificationFanout::new().with_channel(inner_ok.clone());
        let outer_ok = RecordingChannel::ok("outer");

        let outer = NotificationFanout::new()
            .with_channel(Arc::new(inner))
            .with_channel(outer_ok.clone());

        outer.send(&sample_alert(Severity::Low)).await.unwrap();
        assert_eq!(inner_ok.calls(), 1);
        assert_eq!(outer_ok.calls(), 1);
        assert_eq!(outer.name(), "composite");
    }
}
