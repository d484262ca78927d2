//! SMTP mail delivery

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{body, subject, NotificationChannel, NotifyError};
use crate::alerts::Alert;
use crate::config::EmailConfig;

/// Port on which SMTP servers expect implicit TLS
const SMTPS_PORT: u16 = 465;

/// Sends one mail per alert to every configured recipient
pub struct EmailChannel {
    config: EmailConfig,
    timeout: Duration,
}

impl EmailChannel {
    pub fn new(config: EmailConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn build_message(&self, alert: &Alert) -> Result<Message, NotifyError> {
        let from: Mailbox = self.config.from.parse().map_err(|e| {
            NotifyError::Email(format!("invalid sender '{}': {}", self.config.from, e))
        })?;

        let mut builder = Message::builder()
            .from(from)
            .subject(self.subject_line(alert))
            .header(ContentType::TEXT_PLAIN);

        for to in &self.config.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| NotifyError::Email(format!("invalid recipient '{}': {}", to, e)))?;
            builder = builder.to(mailbox);
        }

        builder
            .body(body(alert))
            .map_err(|e| NotifyError::Email(e.to_string()))
    }

    fn subject_line(&self, alert: &Alert) -> String {
        let prefix = self.config.subject_prefix.trim();
        if prefix.is_empty() {
            subject(alert)
        } else {
            format!("{} {}", prefix, subject(alert))
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let host = self.config.smtp_host.as_str();
        let builder = if self.config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| NotifyError::Email(e.to_string()))?;

        let mut builder = builder
            .port(self.config.smtp_port)
            .timeout(Some(self.timeout));

        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        if !self.config.enabled {
            return Ok(());
        }

        let message = self.build_message(alert)?;
        let mailer = self.transport()?;

        mailer
            .send(message)
            .await
            .map_err(|e| NotifyError::Email(format!("send failed: {}", e)))?;

        tracing::info!(
            alert_id = alert.id,
            recipients = self.config.to.len(),
            "Alert email sent"
        );
        Ok(())
    }
}
