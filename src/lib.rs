//! opswatch: host and container health monitoring with durable alerts
//!
//! A [`Scheduler`](scheduler::Scheduler) runs every enabled
//! [`Monitor`](monitor::Monitor) on a fixed interval. Monitors compare host
//! and container signals against static thresholds and raise alerts through
//! the [`AlertManager`](alerts::AlertManager), which persists each alert in a
//! SQLite-backed [`AlertStore`](alerts::AlertStore) and forwards the
//! medium and high ones to the configured notification channels.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use opswatch::alerts::{AlertManager, AlertStore, Severity};
//! use opswatch::notify::{LogChannel, NotificationFanout};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(AlertStore::open("alerts.db").await?);
//! let channels = NotificationFanout::new().with_channel(Arc::new(LogChannel::new()));
//! let manager = AlertManager::new(store, Arc::new(channels));
//!
//! let alert = manager.raise_alert("High CPU usage: 95.00%", Severity::Medium).await?;
//! println!("raised alert {}", alert.id);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod scheduler;

// Re-export commonly used types
pub use alerts::{Alert, AlertManager, AlertStatus, AlertStore, Severity, StoreError};
pub use config::Config;
pub use monitor::{Monitor, MonitorError, PassReport};
pub use notify::{NotificationChannel, NotificationFanout, NotifyError};
pub use scheduler::{Scheduler, TickReport};
