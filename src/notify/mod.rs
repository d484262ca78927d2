//! Notification channels for alerts
//!
//! Every channel implements [`NotificationChannel`]. [`NotificationFanout`]
//! is itself a channel that delivers to all of its registered channels, so a
//! composite of several targets can be swapped in wherever a single channel
//! is expected.
//!
//! Implementors: [`LogChannel`], [`EmailChannel`], [`WebhookChannel`],
//! [`NotificationFanout`].

pub mod email;
pub mod fanout;
pub mod logger;
pub mod webhook;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::alerts::Alert;

pub use email::EmailChannel;
pub use fanout::NotificationFanout;
pub use logger::LogChannel;
pub use webhook::WebhookChannel;

/// Default bound on a single delivery attempt
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A delivery target for alerts
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name used in logs and failure reports
    fn name(&self) -> &str;

    /// Attempt delivery of one alert
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// One-line summary used as mail subject and chat text
pub fn subject(alert: &Alert) -> String {
    format!("[{}] Alert: {}", alert.severity, alert.message)
}

/// Plain-text description of an alert
pub fn body(alert: &Alert) -> String {
    format!(
        "Alert Details:\nSeverity: {}\nStatus: {}\nMessage: {}\nTime: {}",
        alert.severity,
        alert.status,
        alert.message,
        alert.created_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

/// A delivery failure attributed to one channel
#[derive(Debug)]
pub struct ChannelFailure {
    pub channel: String,
    pub error: NotifyError,
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.channel, self.error)
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Notification errors: [{}]", join_failures(.0))]
    Aggregate(Vec<ChannelFailure>),
}

impl NotifyError {
    /// Per-channel failures carried by an aggregate error
    pub fn failures(&self) -> &[ChannelFailure] {
        match self {
            NotifyError::Aggregate(failures) => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertStatus, Severity};
    use chrono::{TimeZone, Utc};

    fn alert() -> Alert {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        Alert {
            id: 7,
            message: "High CPU usage: 95.00%".to_string(),
            severity: Severity::Medium,
            status: AlertStatus::New,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn test_subject_and_body() {
        let alert = alert();
        assert_eq!(subject(&alert), "[medium] Alert: High CPU usage: 95.00%");

        let body = body(&alert);
        assert!(body.contains("Severity: medium"));
        assert!(body.contains("Status: new"));
        assert!(body.contains("Time: 2024-03-01 12:30:05"));
    }

    #[test]
    fn test_aggregate_display() {
        let err = NotifyError::Aggregate(vec![
            ChannelFailure {
                channel: "email".to_string(),
                error: NotifyError::Email("connection refused".to_string()),
            },
            ChannelFailure {
                channel: "webhook".to_string(),
                error: NotifyError::Timeout(Duration::from_secs(10)),
            },
        ]);

        let text = err.to_string();
        assert!(text.contains("email: Email error: connection refused"));
        assert!(text.contains("webhook: Delivery timed out"));
        assert_eq!(err.failures().len(), 2);
    }
}
