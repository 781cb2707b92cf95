//! Daemon - IPC server plus the daily tick loop
//!
//! The daemon is the long-running process that:
//! - Serves trigger, billing and record requests over the Unix socket
//! - Fires daily recycling and scheduled distribution at their local times
//! - Pushes assignment and recycling events to subscribed clients

pub mod context;
pub mod handlers;
pub mod tick;

use std::sync::Arc;

use tokio::sync::watch;

pub use context::DaemonContext;
pub use handlers::DaemonHandler;
pub use tick::{DailyJob, JOB_DISTRIBUTE, JOB_RECYCLE, JobKind, TickConfig, TickState, run_tick, run_tick_loop};

use crate::config::Config;
use crate::error::{LeadflowError, Result};
use crate::ipc::server::{IpcServer, IpcServerConfig};
use crate::store::SqliteStore;

/// Build the tick schedule from configuration
pub fn tick_config(config: &Config) -> Result<TickConfig> {
    let distribute_at = config
        .schedule
        .distribute_time()
        .map_err(|e| LeadflowError::InvalidInput(format!("{:#}", e)))?;
    let recycle_at = config
        .schedule
        .recycle_time()
        .map_err(|e| LeadflowError::InvalidInput(format!("{:#}", e)))?;
    Ok(TickConfig::new(config.schedule.check_interval(), distribute_at, recycle_at))
}

/// Run the daemon until Ctrl-C or the IPC server stops
pub async fn run(config: &Config) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);
    let server = Arc::new(IpcServer::with_config(
        IpcServerConfig::default()
            .with_socket_path(&config.ipc.socket_path)
            .with_max_clients(config.ipc.max_clients),
    ));
    let ctx = Arc::new(DaemonContext::with_system_clock(store, config)?.with_event_sender(server.event_sender()));
    let tick = tick_config(config)?;

    log::info!(
        "Daemon starting: db={} socket={} recycle_at={} distribute_at={}",
        config.storage.db_path.display(),
        config.ipc.socket_path.display(),
        config.schedule.recycle_at,
        config.schedule.distribute_at
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick_task = tokio::spawn(run_tick_loop(Arc::clone(&ctx), tick, shutdown_rx));

    let handler = Arc::new(DaemonHandler::new(Arc::clone(&ctx)));
    let running = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { running.run(handler).await });

    let server_result = tokio::select! {
        joined = &mut server_task => joined,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("Shutdown requested");
            server.shutdown();
            server_task.await
        }
    };

    let _ = shutdown_tx.send(true);
    if let Err(e) = tick_task.await {
        log::error!("Tick loop task failed: {}", e);
    }

    server_result.map_err(|e| LeadflowError::Ipc(format!("IPC server task failed: {}", e)))?
}
