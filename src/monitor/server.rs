//! Host resource monitor

use std::sync::Arc;

use async_trait::async_trait;

use super::{MetricsSource, Monitor, MonitorError, PassReport};
use crate::alerts::{AlertManager, Severity};
use crate::config::ServerMonitorConfig;

/// Raises medium alerts when CPU, memory or any disk exceeds its threshold
pub struct ServerMonitor {
    config: ServerMonitorConfig,
    source: Arc<dyn MetricsSource>,
    manager: Arc<AlertManager>,
}

impl ServerMonitor {
    pub fn new(
        config: ServerMonitorConfig,
        source: Arc<dyn MetricsSource>,
        manager: Arc<AlertManager>,
    ) -> Self {
        Self {
            config,
            source,
            manager,
        }
    }

    async fn raise(&self, report: &mut PassReport, item: &str, message: String) {
        match self.manager.raise_alert(&message, Severity::Medium).await {
            Ok(alert) => {
                tracing::info!(monitor = "server", alert_id = alert.id, "{}", message);
                report.alerts_raised += 1;
            }
            Err(e) => report.record(item, e),
        }
    }

    async fn check_disks(&self, report: &mut PassReport) {
        let partitions = match self.source.disk_partitions().await {
            Ok(partitions) => partitions,
            Err(e) => {
                report.record("disk", e);
                return;
            }
        };

        for mount in partitions {
            let item = format!("disk:{}", mount);
            match self.source.disk_usage(&mount).await {
                Ok(usage) if usage > self.config.disk_threshold => {
                    let message = format!("High Disk usage on {}: {:.2}%", mount, usage);
                    self.raise(report, &item, message).await;
                }
                Ok(_) => {}
                Err(e) => report.record(item, e),
            }
        }
    }
}

#[async_trait]
impl Monitor for ServerMonitor {
    fn name(&self) -> &str {
        "server"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self) -> Result<PassReport, MonitorError> {
        let mut report = PassReport::new();

        match self.source.cpu_percent().await {
            Ok(cpu) if cpu > self.config.cpu_threshold => {
                let message = format!("High CPU usage: {:.2}%", cpu);
                self.raise(&mut report, "cpu", message).await;
            }
            Ok(_) => {}
            Err(e) => report.record("cpu", e),
        }

        match self.source.memory_percent().await {
            Ok(memory) if memory > self.config.memory_threshold => {
                let message = format!("High Memory usage: {:.2}%", memory);
                self.raise(&mut report, "memory", message).await;
            }
            Ok(_) => {}
            Err(e) => report.record("memory", e),
        }

        self.check_disks(&mut report).await;

        Ok(report)
    }

    async fn stop(&self) -> Result<(), MonitorError> {
        Ok(())
    }
}
