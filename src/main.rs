mod api;
mod config;
mod db;
mod error;
mod filter;
mod health;
mod limiter;
mod orchestrator;
mod retry;
mod shutdown;
mod translate;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::MarketplaceClient;
use crate::config::Config;
use crate::db::QueueStore;
use crate::error::Result;
use crate::health::HealthMonitor;
use crate::orchestrator::Orchestrator;
use crate::shutdown::ShutdownController;
use crate::translate::Passthrough;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let store = QueueStore::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let health = Arc::new(HealthMonitor::new());
    let controller = ShutdownController::new(cfg.watchdog_timeout);

    let client = MarketplaceClient::new(cfg.clone(), Arc::clone(&health), controller.token())?;
    let orchestrator = Orchestrator::new(
        cfg,
        client,
        store,
        Arc::clone(&health),
        Box::new(Passthrough),
        controller.token(),
    );

    let mut pipeline = tokio::spawn(orchestrator.run());

    tokio::select! {
        res = &mut pipeline => {
            match res {
                Ok(Ok(())) => info!("Pipeline exited cleanly"),
                Ok(Err(e)) => error!("Pipeline returned error: {e}"),
                Err(panic) => error!("Pipeline panicked: {panic}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, requesting shutdown");
            controller.request_shutdown();
            match pipeline.await {
                Ok(Ok(())) => info!("Pipeline drained cleanly"),
                Ok(Err(e)) => error!("Pipeline returned error during shutdown: {e}"),
                Err(panic) => error!("Pipeline panicked during shutdown: {panic}"),
            }
        }
    }

    controller.mark_finished();
    Ok(())
}
