//! Health monitors
//!
//! A [`Monitor`] runs one evaluation pass per scheduler tick and raises alerts
//! through the shared [`AlertManager`](crate::alerts::AlertManager).
//! Implementors: [`ServerMonitor`], [`ContainerMonitor`].
//!
//! Signals come from two capabilities so the checks can run against
//! anything that supplies them: [`MetricsSource`] for the host and
//! [`ContainerRuntime`] for containers.

pub mod container;
pub mod docker;
pub mod server;
pub mod source;

use std::fmt;

use async_trait::async_trait;

pub use container::ContainerMonitor;
pub use docker::{ContainerRuntime, ContainerStats, ContainerSummary, DockerClient, Endpoint};
pub use server::ServerMonitor;
pub use source::{MetricsSource, SysinfoSource};

/// A periodic health check
#[async_trait]
pub trait Monitor: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    /// Run one evaluation pass
    ///
    /// Per-item problems are collected in the report; an error means the
    /// pass as a whole could not run.
    async fn start(&self) -> Result<PassReport, MonitorError>;

    /// Release held resources
    async fn stop(&self) -> Result<(), MonitorError>;
}

/// Outcome of one monitor pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassReport {
    pub alerts_raised: usize,
    pub failures: Vec<PassFailure>,
}

impl PassReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, item: impl Into<String>, error: impl fmt::Display) {
        self.failures.push(PassFailure {
            item: item.into(),
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A problem with one signal or item inside an otherwise completed pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassFailure {
    /// What was being checked, e.g. `cpu`, `disk:/var` or `container:web`
    pub item: String,
    pub error: String,
}

/// Monitor errors
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Sampling failed: {0}")]
    Sampling(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),
}
