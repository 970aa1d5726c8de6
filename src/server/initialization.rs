// src/server/initialization.rs

//! Handles server startup: binding the UDP socket and building the shared
//! `ServiceState` from the loaded configuration.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex as SyncMutex;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

use super::context::ServerContext;
use crate::config::Config;
use crate::core::arbiter::Arbiter;
use crate::core::state::{PoolCapacities, ServiceState};

/// The reassembly buffer's ceiling (spec §4.B "overflow"): generous enough
/// for the largest realistic `6top/cellList`/`6top/stats` POST body on a
/// node with a few dozen links, small enough to bound a malicious or
/// malfunctioning peer's memory cost.
const MAX_REASSEMBLY_BYTES: usize = 64 * 1024;

/// How many recently completed requests the Arbiter remembers for replay
/// (spec §4.B "Idempotence").
const REPLAY_CACHE_CAPACITY: usize = 16;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let capacities = PoolCapacities {
        max_slotframes: config.pools.max_slotframes,
        max_links: config.pools.max_links,
        max_stats_entries: config.pools.max_stats_entries,
        max_enhanced_entries: config.pools.max_enhanced_entries,
        max_proximates: config.vicinity.max_proximates,
    };

    let state = Arc::new(ServiceState::new(
        capacities,
        config.vicinity.pheromone_window.as_secs(),
        config.vicinity.pheromone_decay,
        config.vicinity.pheromone_chunk,
        config.timers.debounce_delay,
    ));

    let bind_addr = (config.bind_address.as_str(), config.bind_port);
    let socket = UdpSocket::bind(bind_addr).await?;
    info!(
        "sixtopd listening on {}:{}/udp",
        config.bind_address, config.bind_port
    );

    let arbiter = Arc::new(SyncMutex::new(Arbiter::new(
        MAX_REASSEMBLY_BYTES,
        REPLAY_CACHE_CAPACITY,
    )));

    Ok(ServerContext {
        config,
        state,
        socket: Arc::new(socket),
        arbiter,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs the pool/timer configuration a deployment is running with.
fn log_startup_info(config: &Config) {
    info!(
        "pools: slotframes={} links={} stats_entries={} enhanced_entries={} vicinity={}",
        config.pools.max_slotframes,
        config.pools.max_links,
        config.pools.max_stats_entries,
        config.pools.max_enhanced_entries,
        config.vicinity.max_proximates,
    );
    info!(
        "timers: debounce={:?} link_update={:?} queue_update={:?} nbrs_update={:?} (nbrs observable by default: {})",
        config.timers.debounce_delay,
        config.timers.link_update_period,
        config.timers.queue_update_period,
        config.timers.nbrs_update_period,
        config.timers.nbrs_observable_default,
    );
    if config.traffic_generator.enabled {
        info!(
            "demo traffic generator enabled, period={:?}",
            config.traffic_generator.period
        );
    }
}
