// src/core/topology/mod.rs

//! Topology & Vicinity Tracker (component E, spec §4.E).

pub mod dag;
pub mod vicinity;

pub use dag::{RoutingSource, StaticRoutingTable, TopologySnapshot};
pub use vicinity::{VicinityEntry, VicinityTracker};
