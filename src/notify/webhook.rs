//! HTTP webhook delivery

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::{subject, NotificationChannel, NotifyError};
use crate::alerts::Alert;
use crate::config::{WebhookConfig, WebhookFormat};

/// Posts alerts to an HTTP endpoint
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    format: WebhookFormat,
    headers: HashMap<String, String>,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Webhook(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            format: config.format,
            headers: config.headers.clone(),
        })
    }

    fn payload(&self, alert: &Alert) -> serde_json::Value {
        match self.format {
            WebhookFormat::Slack => serde_json::json!({ "text": subject(alert) }),
            WebhookFormat::Json => serde_json::json!({
                "alert_id": alert.id,
                "message": alert.message,
                "severity": alert.severity,
                "status": alert.status,
                "created_at": alert.created_at.to_rfc3339(),
            }),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        match self.format {
            WebhookFormat::Slack => "slack",
            WebhookFormat::Json => "webhook",
        }
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(&self.payload(alert));

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifyError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            alert_id = alert.id,
            url = %self.url,
            "Webhook notification sent"
        );

        Ok(())
    }
}
