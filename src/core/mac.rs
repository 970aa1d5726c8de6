// src/core/mac.rs

//! The MAC integration boundary (DESIGN NOTES §9 "Callback-driven MAC
//! integration"): replaces the source's function-pointer registration with
//! a trait the (out-of-scope) TSCH MAC consumes. `ServiceState` implements
//! this trait; a standalone binary without real radio hardware can drive it
//! from the traffic generator (`SPEC_FULL.md` §10).

use crate::core::addr::Addr;

/// Per-frame telemetry the MAC hands to the Service on every reception and
/// transmission-completion event (spec §2 "Data flow").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub slotframe: u32,
    pub timeslot: u16,
    pub channel: u16,
    pub peer: Addr,
    pub rssi: i8,
    pub lqi: u8,
    pub asn: u32,
}

/// Outcome of a transmission attempt, delivered alongside its `FrameMeta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    pub acked: bool,
    pub attempts: u16,
}

/// The callback surface the out-of-scope TSCH MAC drives the Service
/// through. None of these return `Result` to the caller: failures (pool
/// exhaustion, unmatched schedule entry) are logged and dropped, never
/// propagated to the MAC hot path (spec §7).
pub trait MacCallbacks {
    fn on_rx(&self, frame: FrameMeta);
    fn on_tx_complete(&self, frame: FrameMeta, outcome: TxOutcome);
    fn on_parent_change(&self, old: Option<Addr>, new: Option<Addr>);
    fn on_queue_changed(&self, peer: Addr, queue_len: u16);
}
