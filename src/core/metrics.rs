// src/core/metrics.rs

//! Prometheus metrics for the Service (`SPEC_FULL.md` §2 "Metrics"):
//! request throughput and outcomes, pool occupancy per owned kind,
//! vicinity table size, arbiter lock contention, and MAC-callback frame
//! counts. Grounded on `spineldb`'s `core::metrics` — `lazy_static`-
//! registered series gathered by a tiny `axum` server
//! (`server::metrics_server`).

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_gauge_vec,
};

lazy_static! {
    /// Total requests the dispatcher has routed, labeled by resource and
    /// method (spec §4.A).
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "sixtopd_requests_total",
        "Total requests routed by the dispatcher, labeled by resource and method.",
        &["resource", "method"]
    )
    .unwrap();

    /// Total responses, labeled by the transport status code they carried
    /// (spec §6 "Status code mapping").
    pub static ref RESPONSES_TOTAL: CounterVec = register_counter_vec!(
        "sixtopd_responses_total",
        "Total responses returned, labeled by status code.",
        &["status"]
    )
    .unwrap();

    /// Times the Arbiter answered `service unavailable` because another
    /// (resource, method) pair already held the lock (spec §4.B).
    pub static ref ARBITER_CONTENTION_TOTAL: Counter = register_counter!(
        "sixtopd_arbiter_contention_total",
        "Total requests rejected as busy due to Arbiter lock contention."
    )
    .unwrap();

    /// Live occupancy of each fixed-capacity pool, labeled by kind
    /// (slotframe, link, stats_entry, enhanced_entry, vicinity_entry).
    pub static ref POOL_OCCUPANCY: GaugeVec = register_gauge_vec!(
        "sixtopd_pool_occupancy",
        "Live entries in each fixed-capacity pool, labeled by kind.",
        &["kind"]
    )
    .unwrap();

    /// Total frame-reception callbacks observed from the MAC (spec §2
    /// "Data flow").
    pub static ref FRAMES_RX_TOTAL: Counter = register_counter!(
        "sixtopd_frames_rx_total",
        "Total frame-reception callbacks delivered by the MAC."
    )
    .unwrap();

    /// Total transmission-completion callbacks, labeled by whether the
    /// frame was acknowledged.
    pub static ref FRAMES_TX_TOTAL: CounterVec = register_counter_vec!(
        "sixtopd_frames_tx_total",
        "Total transmission-completion callbacks, labeled by ack outcome.",
        &["acked"]
    )
    .unwrap();

    /// Current size of the vicinity (neighbour freshness) table.
    pub static ref VICINITY_SIZE: Gauge = register_gauge!(
        "sixtopd_vicinity_size",
        "Current number of entries in the vicinity freshness table."
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text
/// format, for `GET /metrics`.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
