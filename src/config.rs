//! Service configuration
//!
//! Loaded from a YAML file, then adjusted by a few environment variables:
//! - `OPSWATCH_CONFIG`: config file path (default: `config/config.yaml`)
//! - `OPSWATCH_HOST`: API bind address
//! - `OPSWATCH_PORT`: API port
//! - `OPSWATCH_DB_PATH`: alert database file

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::notify::{EmailChannel, LogChannel, NotificationFanout, NotifyError, WebhookChannel};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitoring: MonitoringConfig,
    pub server_monitoring: ServerMonitorConfig,
    pub container_monitoring: ContainerMonitorConfig,
    pub alert: AlertConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Seconds between scheduler ticks
    pub interval: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { interval: 60 }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

/// Host thresholds, as percentages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerMonitorConfig {
    pub enabled: bool,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub disk_threshold: f64,
}

impl Default for ServerMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            disk_threshold: 90.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerMonitorConfig {
    pub enabled: bool,
    /// Docker Engine endpoint; falls back to `DOCKER_HOST`
    pub docker_host: Option<String>,
    /// Watched containers, checked in this order
    pub containers: Vec<ContainerDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDetail {
    pub name: String,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub database_path: PathBuf,
    /// Per-channel delivery timeout in seconds
    pub notify_timeout_secs: u64,
    pub email: EmailConfig,
    pub webhooks: Vec<WebhookConfig>,
    /// Also write alerts to the process log
    pub log: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("alerts.db"),
            notify_timeout_secs: 10,
            email: EmailConfig::default(),
            webhooks: Vec::new(),
            log: true,
        }
    }
}

impl AlertConfig {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject_prefix: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            to: Vec::new(),
            subject_prefix: "[opswatch]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub format: WebhookFormat,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Payload shape posted to a webhook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookFormat {
    /// `{"text": ...}`, accepted by Slack-compatible incoming webhooks
    Slack,
    #[default]
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load from the path in `OPSWATCH_CONFIG`, apply overrides and validate
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("OPSWATCH_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file without validating it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `OPSWATCH_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OPSWATCH_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("OPSWATCH_PORT") {
            self.api.port = port
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid port {:?}: {}", port, e)))?;
        }
        if let Some(path) = lookup("OPSWATCH_DB_PATH") {
            self.alert.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.interval == 0 {
            return Err(ConfigError::Invalid(
                "monitoring.interval must be greater than zero".to_string(),
            ));
        }

        let server = &self.server_monitoring;
        for (name, value) in [
            ("cpu_threshold", server.cpu_threshold),
            ("memory_threshold", server.memory_threshold),
            ("disk_threshold", server.disk_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "server_monitoring.{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        if self
            .container_monitoring
            .containers
            .iter()
            .any(|c| c.name.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "container_monitoring.containers entries need a name".to_string(),
            ));
        }

        let email = &self.alert.email;
        if email.enabled {
            if email.smtp_host.is_empty() {
                return Err(ConfigError::Invalid("alert.email.smtp_host is required".to_string()));
            }
            if email.from.is_empty() {
                return Err(ConfigError::Invalid("alert.email.from is required".to_string()));
            }
            if email.to.is_empty() {
                return Err(ConfigError::Invalid(
                    "alert.email.to needs at least one recipient".to_string(),
                ));
            }
        }

        if let Some(hook) = self.alert.webhooks.iter().find(|w| w.url.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "webhook url must not be empty (format {:?})",
                hook.format
            )));
        }

        Ok(())
    }

    /// Build the configured notification channels behind one fanout
    pub fn build_channels(&self) -> Result<NotificationFanout, NotifyError> {
        let timeout = self.alert.notify_timeout();
        let mut fanout = NotificationFanout::with_timeout(timeout);

        if self.alert.log {
            fanout.register(Arc::new(LogChannel::new()));
        }
        if self.alert.email.enabled {
            fanout.register(Arc::new(EmailChannel::new(self.alert.email.clone(), timeout)));
        }
        for hook in &self.alert.webhooks {
            fanout.register(Arc::new(WebhookChannel::new(hook, timeout)?));
        }

        Ok(fanout)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
