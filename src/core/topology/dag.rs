// src/core/topology/dag.rs

//! RPL topology projection (spec §4.E "Topology projection"). The RPL
//! engine itself is out of scope; `RoutingSource` is the trait boundary it
//! implements, symmetric to `MacCallbacks` (DESIGN NOTES §9).

use crate::core::addr::Addr;

/// Read-only view onto the out-of-scope RPL engine's current state.
pub trait RoutingSource: Send + Sync {
    fn preferred_parent(&self) -> Option<Addr>;
    /// Ordered, distinct next-hop addresses appearing in the routing table
    /// (children-enumeration semantics — `SPEC_FULL.md` §9, Open Question 3).
    fn next_hop_addresses(&self) -> Vec<Addr>;
}

/// A standalone, callback-driven `RoutingSource` for running and testing
/// without a real RPL engine attached.
#[derive(Default)]
pub struct StaticRoutingTable {
    inner: parking_lot::Mutex<StaticRoutingState>,
}

#[derive(Default, Clone)]
struct StaticRoutingState {
    parent: Option<Addr>,
    next_hops: Vec<Addr>,
}

impl StaticRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_parent_change(&self, new: Option<Addr>) {
        self.inner.lock().parent = new;
    }

    pub fn on_routes_changed(&self, next_hops: Vec<Addr>) {
        self.inner.lock().next_hops = next_hops;
    }
}

impl RoutingSource for StaticRoutingTable {
    fn preferred_parent(&self) -> Option<Addr> {
        self.inner.lock().parent
    }

    fn next_hop_addresses(&self) -> Vec<Addr> {
        self.inner.lock().next_hops.clone()
    }
}

/// `get_parent_and_children()` (spec §4.E): no caching, read-through on
/// every call.
pub fn snapshot(source: &dyn RoutingSource) -> TopologySnapshot {
    TopologySnapshot {
        parent: source.preferred_parent(),
        next_hops: source.next_hop_addresses(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub parent: Option<Addr>,
    pub next_hops: Vec<Addr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_latest_callback_state() {
        let table = StaticRoutingTable::new();
        assert_eq!(snapshot(&table).parent, None);
        table.on_parent_change(Some(Addr([1; 8])));
        table.on_routes_changed(vec![Addr([2; 8]), Addr([3; 8])]);
        let snap = snapshot(&table);
        assert_eq!(snap.parent, Some(Addr([1; 8])));
        assert_eq!(snap.next_hops, vec![Addr([2; 8]), Addr([3; 8])]);
    }
}
