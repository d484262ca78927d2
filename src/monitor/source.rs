//! Host metrics capability

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Disks, System};

use super::MonitorError;

/// Host resource readings, each a percentage in `0..=100`
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn cpu_percent(&self) -> Result<f64, MonitorError>;

    async fn memory_percent(&self) -> Result<f64, MonitorError>;

    /// Mount points of the local disks
    async fn disk_partitions(&self) -> Result<Vec<String>, MonitorError>;

    async fn disk_usage(&self, mount: &str) -> Result<f64, MonitorError>;
}

/// [`MetricsSource`] backed by the `sysinfo` crate
pub struct SysinfoSource {
    system: Mutex<System>,
    disks: Mutex<Disks>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SysinfoSource {
    async fn cpu_percent(&self) -> Result<f64, MonitorError> {
        // Usage is a delta between two refreshes
        self.system.lock().refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

        let mut sys = self.system.lock();
        sys.refresh_cpu_usage();
        if sys.cpus().is_empty() {
            return Err(MonitorError::Sampling("no CPUs reported".to_string()));
        }
        Ok(sys.global_cpu_usage() as f64)
    }

    async fn memory_percent(&self) -> Result<f64, MonitorError> {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(MonitorError::Sampling("total memory reported as zero".to_string()));
        }
        Ok(sys.used_memory() as f64 / total as f64 * 100.0)
    }

    async fn disk_partitions(&self) -> Result<Vec<String>, MonitorError> {
        let mut disks = self.disks.lock();
        disks.refresh_list();

        Ok(disks
            .list()
            .iter()
            .map(|d| d.mount_point().to_string_lossy().into_owned())
            .collect())
    }

    async fn disk_usage(&self, mount: &str) -> Result<f64, MonitorError> {
        let mut disks = self.disks.lock();
        disks.refresh();

        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point().to_string_lossy() == mount)
            .ok_or_else(|| MonitorError::Sampling(format!("no disk mounted at {}", mount)))?;

        let total = disk.total_space();
        if total == 0 {
            return Err(MonitorError::Sampling(format!("{} reports zero capacity", mount)));
        }
        let used = total.saturating_sub(disk.available_space());
        Ok(used as f64 / total as f64 * 100.0)
    }
}
