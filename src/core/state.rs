// src/core/state.rs

//! Ties the owned components (Schedule Manager, Statistics Engine,
//! Vicinity Tracker) and their read-through collaborator (the RPL
//! `RoutingSource`) into one value the dispatcher and the MAC integration
//! boundary both hold. Grounded on `spineldb`'s `core::state::ServerState`:
//! one struct, one lock around the mutable store, `Arc`-shared into every
//! task that touches it.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::core::addr::Addr;
use crate::core::dispatch::ResourceKind;
use crate::core::events::ObserverHub;
use crate::core::mac::{FrameMeta, MacCallbacks, TxOutcome};
use crate::core::schedule::ScheduleStore;
use crate::core::stats::StatisticsEngine;
use crate::core::topology::dag::{self, StaticRoutingTable};
use crate::core::topology::VicinityTracker;

/// Seconds since the Unix epoch, the single clock every owned component
/// that tracks freshness (vicinity timestamps) reads from.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}

/// The mutable store: everything component C/D/E own. Guarded by a single
/// `parking_lot::Mutex` in `ServiceState` — uncontended on the binary's
/// single event-loop task, correct under the concurrent access a test
/// suite gives it (spec §5).
pub struct ServiceCore {
    pub schedule: ScheduleStore,
    pub stats: StatisticsEngine,
    pub vicinity: VicinityTracker,
    /// Latest per-neighbour outgoing queue length observed from the MAC
    /// (`6top/queue`, `SPEC_FULL.md` §10).
    pub queue_lengths: Vec<(Addr, u16)>,
}

impl ServiceCore {
    pub fn record_queue_length(&mut self, peer: Addr, len: u16) {
        if let Some(entry) = self.queue_lengths.iter_mut().find(|(p, _)| *p == peer) {
            entry.1 = len;
        } else {
            self.queue_lengths.push((peer, len));
        }
    }
}

/// Pool capacities fixed at startup (spec §3 "fixed-capacity pools").
#[derive(Debug, Clone, Copy)]
pub struct PoolCapacities {
    pub max_slotframes: usize,
    pub max_links: usize,
    pub max_stats_entries: usize,
    pub max_enhanced_entries: usize,
    pub max_proximates: usize,
}

/// Owns the mutable store, the observer hub, the routing-projection
/// collaborator, and the vicinity-decay constants every timer task reads.
/// One instance is constructed at startup and shared as `Arc<ServiceState>`
/// across the event loop, the MAC callback path, and every dispatcher
/// handler invocation.
pub struct ServiceState {
    core: Mutex<ServiceCore>,
    pub observers: ObserverHub,
    /// Concrete rather than `Arc<dyn RoutingSource>`: standalone running
    /// and the test suite both need to drive `on_parent_change`/
    /// `on_routes_changed` directly (spec §4.E); reads elsewhere still go
    /// through the `RoutingSource` trait object.
    pub routing: StaticRoutingTable,
    pub pheromone_window_secs: u64,
    pub pheromone_decay: i64,
    pub pheromone_chunk: i64,
}

impl ServiceState {
    pub fn new(
        capacities: PoolCapacities,
        pheromone_window_secs: u64,
        pheromone_decay: i64,
        pheromone_chunk: i64,
        debounce_delay: std::time::Duration,
    ) -> Self {
        let core = ServiceCore {
            schedule: ScheduleStore::new(capacities.max_slotframes, capacities.max_links),
            stats: StatisticsEngine::new(
                capacities.max_stats_entries,
                capacities.max_enhanced_entries,
            ),
            vicinity: VicinityTracker::new(capacities.max_proximates),
            queue_lengths: Vec::new(),
        };
        Self {
            core: Mutex::new(core),
            observers: ObserverHub::new(debounce_delay),
            routing: StaticRoutingTable::new(),
            pheromone_window_secs,
            pheromone_decay,
            pheromone_chunk,
        }
    }

    /// Runs `f` against the mutable store under the single lock. Every
    /// dispatcher handler and every MAC/timer callback goes through this —
    /// there is no other path to the arenas (spec §5 "only this loop ever
    /// mutates").
    pub fn with_core<R>(&self, f: impl FnOnce(&mut ServiceCore) -> R) -> R {
        f(&mut self.core.lock())
    }

    /// The current RPL projection, JSON-encoded, for both `GET rpl/dag`
    /// and the debounced change notification it shares a body format with.
    pub fn topology_snapshot_body(&self) -> Vec<u8> {
        let snapshot = dag::snapshot(&self.routing);
        serde_json::to_vec(&crate::core::dispatch::json::topology_to_json(&snapshot))
            .expect("topology snapshot serialises")
    }

    /// The neighbour-table projection sharing the same next-hop data as
    /// `rpl/dag` (DESIGN.md: `6top/nbrs` and `rpl/dag`'s children both
    /// derive from `RoutingSource::next_hop_addresses`, the original's
    /// single route-neighbour-table iteration).
    pub fn nbrs_snapshot_body(&self) -> Vec<u8> {
        let addrs = self.routing.next_hop_addresses();
        let body: Vec<serde_json::Value> = addrs
            .iter()
            .map(|a| serde_json::json!({ "tna": a.to_string() }))
            .collect();
        serde_json::to_vec(&body).expect("nbrs snapshot serialises")
    }

    /// The `6top/cellList` projection, for the periodic `LINK_UPDATE`
    /// notification.
    pub fn cell_list_snapshot_body(&self) -> Vec<u8> {
        self.with_core(|core| {
            let body: Vec<serde_json::Value> = core
                .schedule
                .iter_links()
                .map(|(handle, link)| {
                    let stats: Vec<serde_json::Value> = link
                        .stats
                        .iter()
                        .filter_map(|h| core.stats.entry(*h))
                        .map(|e| serde_json::json!(e.id()))
                        .collect();
                    crate::core::dispatch::json::link_to_json(handle, link, stats)
                })
                .collect();
            serde_json::to_vec(&body).expect("cellList snapshot serialises")
        })
    }

    /// The `6top/queue` projection, for the periodic `QUEUE_UPDATE`
    /// notification.
    pub fn queue_snapshot_body(&self) -> Vec<u8> {
        self.with_core(|core| {
            let body: Vec<serde_json::Value> = core
                .queue_lengths
                .iter()
                .map(|(peer, len)| crate::core::dispatch::json::queue_entry_to_json(*peer, *len))
                .collect();
            serde_json::to_vec(&body).expect("queue snapshot serialises")
        })
    }

    /// The `mac/vicinity` projection, for the `10 × PHEROMONE_WINDOW`
    /// notification.
    pub fn vicinity_snapshot_body(&self) -> Vec<u8> {
        let now = now_secs();
        self.with_core(|core| {
            let body: Vec<serde_json::Value> = core
                .vicinity
                .iter()
                .map(|e| crate::core::dispatch::json::vicinity_entry_to_json(e, now))
                .collect();
            serde_json::to_vec(&body).expect("vicinity snapshot serialises")
        })
    }

    /// Runs the vicinity decay pass (spec §4.E "Decay task").
    pub fn decay_vicinity(&self) {
        let now = now_secs();
        self.with_core(|core| {
            core.vicinity
                .decay(now, self.pheromone_window_secs, self.pheromone_decay);
        });
        crate::core::metrics::VICINITY_SIZE.set(self.with_core(|core| core.vicinity.len()) as f64);
    }

    /// Snapshots current pool occupancy into the gauges (spec §2
    /// "Metrics").
    pub fn report_pool_occupancy(&self) {
        self.with_core(|core| {
            crate::core::metrics::POOL_OCCUPANCY
                .with_label_values(&["slotframe"])
                .set(core.schedule.iter_slotframes().count() as f64);
            crate::core::metrics::POOL_OCCUPANCY
                .with_label_values(&["link"])
                .set(core.schedule.iter_links().count() as f64);
            crate::core::metrics::POOL_OCCUPANCY
                .with_label_values(&["stats_entry"])
                .set(core.stats.iter_entries().count() as f64);
            crate::core::metrics::POOL_OCCUPANCY
                .with_label_values(&["vicinity_entry"])
                .set(core.vicinity.len() as f64);
        });
    }
}

impl MacCallbacks for ServiceState {
    /// Frame-reception callback: updates the matching statistics entries
    /// and touches the sender's vicinity entry (spec §4.D, §4.E).
    fn on_rx(&self, frame: FrameMeta) {
        let now = now_secs();
        let chunk = self.pheromone_chunk;
        self.with_core(|core| {
            core.stats.on_rx(
                &core.schedule,
                frame.slotframe,
                frame.timeslot,
                frame.peer,
                frame.rssi as i64,
                frame.lqi as i64,
                frame.asn,
            );
            core.vicinity.touch(frame.peer, now, chunk);
        });
        crate::core::metrics::FRAMES_RX_TOTAL.inc();
    }

    /// Transmission-completion callback: ETX/PDR update on acknowledged
    /// frames, and vicinity touch for every acknowledged sent frame (spec
    /// §4.D, §4.E).
    fn on_tx_complete(&self, frame: FrameMeta, outcome: TxOutcome) {
        let now = now_secs();
        let chunk = self.pheromone_chunk;
        self.with_core(|core| {
            core.stats.on_tx_complete(
                &core.schedule,
                frame.slotframe,
                frame.timeslot,
                outcome.acked,
                outcome.attempts,
            );
            if outcome.acked {
                core.vicinity.touch(frame.peer, now, chunk);
            }
        });
        crate::core::metrics::FRAMES_TX_TOTAL
            .with_label_values(&[if outcome.acked { "true" } else { "false" }])
            .inc();
    }

    /// Routing-callback signal (spec §4.F): restarts the topology
    /// resource's debounce window.
    fn on_parent_change(&self, _old: Option<Addr>, new: Option<Addr>) {
        self.routing.on_parent_change(new);
        self.observers
            .notify_topology_debounced(self.topology_snapshot_body());
    }

    fn on_queue_changed(&self, peer: Addr, queue_len: u16) {
        self.with_core(|core| core.record_queue_length(peer, queue_len));
    }
}

/// The unique-identifier query key for each resource, used by
/// `dispatch::query::project` to decide when a filtered array collapses to
/// a single scalar/object (spec §4.A).
pub const fn unique_keys(resource: ResourceKind) -> &'static [&'static str] {
    match resource {
        ResourceKind::SlotFrame => &["fd"],
        ResourceKind::CellList => &["cd"],
        ResourceKind::Stats => &["id"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::addr::Addr;

    fn test_state() -> ServiceState {
        ServiceState::new(
            PoolCapacities {
                max_slotframes: 4,
                max_links: 16,
                max_stats_entries: 16,
                max_enhanced_entries: 16,
                max_proximates: 4,
            },
            300,
            10,
            5,
            std::time::Duration::from_secs(5),
        )
    }

    #[test]
    fn on_rx_updates_stats_and_vicinity_under_one_lock() {
        let state = test_state();
        state.with_core(|core| {
            core.schedule.add_slotframe(1, 101).unwrap();
            let link = core
                .schedule
                .add_link(
                    1,
                    5,
                    2,
                    crate::core::schedule::LinkOptions::RX,
                    crate::core::schedule::LinkType::Normal,
                    Addr::BROADCAST,
                )
                .unwrap();
            let _ = link;
        });
        let sender = Addr([7; 8]);
        state.on_rx(FrameMeta {
            slotframe: 1,
            timeslot: 5,
            channel: 2,
            peer: sender,
            rssi: -60,
            lqi: 200,
            asn: 42,
        });
        state.with_core(|core| {
            assert_eq!(core.vicinity.len(), 1);
        });
    }

    #[test]
    fn on_parent_change_updates_routing_source() {
        let state = test_state();
        let new_parent = Addr([9; 8]);
        state.on_parent_change(None, Some(new_parent));
        assert_eq!(state.routing.preferred_parent(), Some(new_parent));
    }
}
