//! opswatch server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - OPSWATCH_CONFIG: Config file path (default: config/config.yaml)
//! - OPSWATCH_HOST: API bind address (overrides api.host)
//! - OPSWATCH_PORT: API port (overrides api.port)
//! - OPSWATCH_DB_PATH: Alert database file (overrides alert.database_path)
//! - DOCKER_HOST: Docker Engine endpoint when container_monitoring.docker_host is unset
//! - RUST_LOG: Log level (default: info)

use std::sync::Arc;

use opswatch::alerts::{AlertManager, AlertStore};
use opswatch::api::{run_server, shutdown_signal, AppState};
use opswatch::config::Config;
use opswatch::monitor::{ContainerMonitor, Monitor, ServerMonitor, SysinfoSource};
use opswatch::scheduler::Scheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opswatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("opswatch configuration:");
    tracing::info!("  Interval: {} seconds", config.monitoring.interval);
    tracing::info!(
        "  Server monitoring: {} (cpu > {}%, memory > {}%, disk > {}%)",
        enabled(config.server_monitoring.enabled),
        config.server_monitoring.cpu_threshold,
        config.server_monitoring.memory_threshold,
        config.server_monitoring.disk_threshold
    );
    tracing::info!(
        "  Container monitoring: {} ({} watched)",
        enabled(config.container_monitoring.enabled),
        config.container_monitoring.containers.len()
    );
    tracing::info!("  Alert database: {}", config.alert.database_path.display());

    let store = Arc::new(AlertStore::open(&config.alert.database_path).await?);

    let channels = config.build_channels()?;
    tracing::info!("  Notification channels: {:?}", channels.channel_names());
    let manager = Arc::new(AlertManager::new(Arc::clone(&store), Arc::new(channels)));

    let monitors: Vec<Arc<dyn Monitor>> = vec![
        Arc::new(ServerMonitor::new(
            config.server_monitoring.clone(),
            Arc::new(SysinfoSource::new()),
            Arc::clone(&manager),
        )),
        Arc::new(ContainerMonitor::from_config(
            config.container_monitoring.clone(),
            Arc::clone(&manager),
        )),
    ];

    let mut scheduler = Scheduler::new(monitors, config.monitoring.interval());
    scheduler.start();

    let served = if config.api.enabled {
        let state = Arc::new(AppState {
            manager: Arc::clone(&manager),
        });
        run_server(&config.api, state, shutdown_signal()).await
    } else {
        shutdown_signal().await;
        Ok(())
    };

    scheduler.stop().await;
    store.close().await;
    tracing::info!(ticks = scheduler.ticks(), "opswatch stopped");

    served
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}
