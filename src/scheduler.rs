//! Periodic polling loop over all monitors

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::monitor::Monitor;

/// Shortest accepted polling interval
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Summary of one tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// 1-based sequence number of this tick
    pub tick: u64,
    /// Enabled monitors that were started
    pub monitors_run: usize,
    /// Disabled monitors
    pub monitors_skipped: usize,
    /// Started monitors whose pass returned an error
    pub monitors_failed: usize,
    pub alerts_raised: usize,
}

/// Drives every enabled monitor once per interval
///
/// The first tick runs as soon as the loop starts. Monitors run one after
/// another; a failing monitor is logged and the tick moves on. Ticks that
/// fall behind are delayed rather than run back to back.
pub struct Scheduler {
    monitors: Arc<Vec<Arc<dyn Monitor>>>,
    period: Duration,
    ticks: Arc<AtomicU64>,
    state: SchedulerState,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Periods shorter than [`MIN_PERIOD`] are raised to it.
    pub fn new(monitors: Vec<Arc<dyn Monitor>>, period: Duration) -> Self {
        let period = if period < MIN_PERIOD {
            tracing::warn!(
                requested_ms = period.as_millis() as u64,
                "Scheduler interval too short, using {:?}",
                MIN_PERIOD
            );
            MIN_PERIOD
        } else {
            period
        };

        Self {
            monitors: Arc::new(monitors),
            period,
            ticks: Arc::new(AtomicU64::new(0)),
            state: SchedulerState::Idle,
            shutdown_tx: None,
            handle: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of ticks completed or in progress
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Spawn the polling loop. Has no effect unless the scheduler is idle.
    pub fn start(&mut self) {
        if self.state != SchedulerState::Idle {
            tracing::warn!(state = ?self.state, "Scheduler already started");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let monitors = Arc::clone(&self.monitors);
        let ticks = Arc::clone(&self.ticks);
        let period = self.period;

        tracing::info!(
            monitors = monitors.len(),
            interval_secs = period.as_secs_f64(),
            "Scheduler starting"
        );

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::tick(&monitors, &ticks).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                }
            }

            for monitor in monitors.iter() {
                if let Err(e) = monitor.stop().await {
                    tracing::error!(
                        monitor = %monitor.name(),
                        error = %e,
                        "Failed to stop monitor"
                    );
                }
            }
        }));

        self.state = SchedulerState::Running;
    }

    /// Signal the loop and wait for it to finish
    ///
    /// A tick in progress completes first; every monitor is then stopped.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler task failed");
            }
        }
        self.state = SchedulerState::Stopped;
    }

    /// Run a single tick on the calling task
    pub async fn run_tick(&self) -> TickReport {
        Self::tick(&self.monitors, &self.ticks).await
    }

    async fn tick(monitors: &[Arc<dyn Monitor>], ticks: &AtomicU64) -> TickReport {
        let mut report = TickReport {
            tick: ticks.fetch_add(1, Ordering::SeqCst) + 1,
            ..Default::default()
        };

        for monitor in monitors {
            if !monitor.is_enabled() {
                report.monitors_skipped += 1;
                continue;
            }

            report.monitors_run += 1;
            match monitor.start().await {
                Ok(pass) => {
                    report.alerts_raised += pass.alerts_raised;
                    for failure in &pass.failures {
                        tracing::warn!(
                            monitor = %monitor.name(),
                            item = %failure.item,
                            error = %failure.error,
                            "Check failed"
                        );
                    }
                }
                Err(e) => {
                    report.monitors_failed += 1;
                    tracing::error!(monitor = %monitor.name(), error = %e, "Monitor pass failed");
                }
            }
        }

        tracing::debug!(
            tick = report.tick,
            run = report.monitors_run,
            failed = report.monitors_failed,
            alerts = report.alerts_raised,
            "Tick complete"
        );
        report
    }
}
