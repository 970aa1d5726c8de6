// src/server/spawner.rs

//! Spawns the server's periodic background tasks: the Prometheus metrics
//! server, the vicinity decay pass, the periodic observable-resource
//! notifiers, and (if enabled) the demo traffic generator.

use tracing::info;

use super::context::ServerContext;
use super::metrics_server;
use super::traffic_generator;
use crate::core::dispatch::ResourceKind;

/// Spawns all background tasks into the context's `JoinSet`.
pub fn spawn_all(ctx: &mut ServerContext) {
    let state = ctx.state.clone();
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    if ctx.config.metrics.enabled {
        let metrics_state = state.clone();
        let port = ctx.config.metrics.port;
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run(metrics_state, port, shutdown_rx).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // Vicinity decay + pool occupancy gauges: one tick per PHEROMONE_WINDOW,
    // a tenth of it, matches spec §4.E's decay cadence.
    {
        let decay_state = state.clone();
        let period = (ctx.config.vicinity.pheromone_window / 10).max(std::time::Duration::from_secs(1));
        let mut shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        decay_state.decay_vicinity();
                        decay_state.report_pool_occupancy();
                    }
                }
            }
            Ok(())
        });
    }

    // 6top/cellList: LINK_UPDATE_PERIOD.
    {
        let notify_state = state.clone();
        let period = ctx.config.timers.link_update_period;
        let mut shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        let body = notify_state.cell_list_snapshot_body();
                        notify_state.observers.notify(ResourceKind::CellList, body);
                    }
                }
            }
            Ok(())
        });
    }

    // 6top/queue: QUEUE_UPDATE_PERIOD.
    {
        let notify_state = state.clone();
        let period = ctx.config.timers.queue_update_period;
        let mut shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        let body = notify_state.queue_snapshot_body();
                        notify_state.observers.notify(ResourceKind::Queue, body);
                    }
                }
            }
            Ok(())
        });
    }

    // mac/vicinity: 10 x PHEROMONE_WINDOW (spec §6).
    {
        let notify_state = state.clone();
        let period = ctx.config.vicinity.pheromone_window * 10;
        let mut shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        let body = notify_state.vicinity_snapshot_body();
                        notify_state.observers.notify(ResourceKind::Vicinity, body);
                    }
                }
            }
            Ok(())
        });
    }

    // 6top/nbrs: configurable, off by default (spec §6).
    if ctx.config.timers.nbrs_observable_default {
        let notify_state = state.clone();
        let period = ctx.config.timers.nbrs_update_period;
        let mut shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        let body = notify_state.nbrs_snapshot_body();
                        notify_state.observers.notify(ResourceKind::Nbrs, body);
                    }
                }
            }
            Ok(())
        });
    }

    if ctx.config.traffic_generator.enabled {
        let traffic_state = state.clone();
        let period = ctx.config.traffic_generator.period;
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            traffic_generator::run(traffic_state, period, shutdown_rx).await;
            Ok(())
        });
    }

    info!("all background tasks spawned");
}
