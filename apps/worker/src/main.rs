mod config;
mod dispatcher;
mod main_lib;
mod trading_core;

use config::Config;
use main_lib::{build_worker, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_format);
    let worker = build_worker(&config).await?;

    let (_services, dispatcher) = worker.start();
    tracing::info!("Worker ready, database at {}", config.db_path);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    dispatcher.abort();
    Ok(())
}
