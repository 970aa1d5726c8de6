// src/server/mod.rs

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;
mod traffic_generator;

use anyhow::Result;

use crate::config::Config;

/// The main server startup function: initialize, spawn background tasks,
/// then run the event loop until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let mut ctx = initialization::setup(config).await?;
    spawner::spawn_all(&mut ctx);
    connection_loop::run(ctx).await;
    Ok(())
}
