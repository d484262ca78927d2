//! Container state monitor

use std::sync::Arc;

use async_trait::async_trait;

use super::{ContainerRuntime, DockerClient, Monitor, MonitorError, PassReport};
use crate::alerts::{AlertManager, Severity};
use crate::config::ContainerMonitorConfig;

/// Watches a fixed list of containers by name
pub struct ContainerMonitor {
    config: ContainerMonitorConfig,
    runtime: Result<Arc<dyn ContainerRuntime>, String>,
    manager: Arc<AlertManager>,
}

impl ContainerMonitor {
    pub fn new(
        config: ContainerMonitorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        manager: Arc<AlertManager>,
    ) -> Self {
        Self {
            config,
            runtime: Ok(runtime),
            manager,
        }
    }

    /// Connect to the configured Docker engine
    ///
    /// A client that cannot be set up does not prevent construction; every
    /// pass then fails with [`MonitorError::DependencyUnavailable`].
    pub fn from_config(config: ContainerMonitorConfig, manager: Arc<AlertManager>) -> Self {
        let runtime = match DockerClient::new(config.docker_host.as_deref()) {
            Ok(client) => Ok(Arc::new(client) as Arc<dyn ContainerRuntime>),
            Err(e) => {
                tracing::warn!(error = %e, "Docker client unavailable");
                Err(e.to_string())
            }
        };

        Self {
            config,
            runtime,
            manager,
        }
    }

    async fn raise(
        &self,
        report: &mut PassReport,
        item: &str,
        message: String,
        severity: Severity,
    ) {
        match self.manager.raise_alert(&message, severity).await {
            Ok(alert) => {
                tracing::info!(monitor = "container", alert_id = alert.id, "{}", message);
                report.alerts_raised += 1;
            }
            Err(e) => report.record(item, e),
        }
    }
}

#[async_trait]
impl Monitor for ContainerMonitor {
    fn name(&self) -> &str {
        "container"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self) -> Result<PassReport, MonitorError> {
        let runtime = self
            .runtime
            .as_ref()
            .map_err(|reason| MonitorError::DependencyUnavailable(reason.clone()))?;

        let containers = runtime.list_containers(true).await?;
        let mut report = PassReport::new();

        for watched in &self.config.containers {
            let item = format!("container:{}", watched.name);

            let Some(container) = containers.iter().find(|c| c.name() == watched.name) else {
                tracing::debug!(container = %watched.name, "Watched container not found");
                report.record(item, "no such container");
                continue;
            };

            if container.state != "running" {
                let message = format!(
                    "Container {} is not running. Current state: {}",
                    watched.name, container.state
                );
                self.raise(&mut report, &item, message, Severity::High).await;
            }

            let stats = match runtime.container_stats(&container.id).await {
                Ok(stats) => stats,
                Err(e) => {
                    tracing::warn!(container = %watched.name, error = %e, "Failed to get stats");
                    report.record(item, e);
                    continue;
                }
            };

            if stats.os_type.is_empty() {
                let message = format!("Container {} stats unavailable", watched.name);
                self.raise(&mut report, &item, message, Severity::Medium).await;
            }
        }

        Ok(report)
    }

    async fn stop(&self) -> Result<(), MonitorError> {
        match &self.runtime {
            Ok(runtime) => runtime.close().await,
            Err(_) => Ok(()),
        }
    }
}
