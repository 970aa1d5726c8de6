// src/server/traffic_generator.rs

//! Demo traffic generator (`SPEC_FULL.md` §10): drives `MacCallbacks` with
//! synthetic frames so the Statistics Engine and Vicinity Tracker have
//! something to report without real TSCH radio hardware underneath. Off
//! by default; a deployment with a real MAC never spawns this task.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tracing::debug;

use crate::core::addr::Addr;
use crate::core::mac::{FrameMeta, MacCallbacks, TxOutcome};
use crate::core::state::ServiceState;

/// Derives a stable synthetic neighbour address from a link's `(timeslot,
/// channel)` pair, so repeated ticks touch the same vicinity/stats entries
/// instead of fabricating a new neighbour every time.
fn synthetic_peer(timeslot: u16, channel: u16) -> Addr {
    let mut bytes = [0u8; 8];
    bytes[0] = 0xae;
    bytes[6..8].copy_from_slice(&timeslot.to_be_bytes());
    bytes[4..6].copy_from_slice(&channel.to_be_bytes());
    Addr(bytes)
}

/// Runs the traffic generator until shutdown: each tick, every scheduled
/// link with an RX or TX option gets one synthetic frame event.
pub async fn run(state: Arc<ServiceState>, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut rng = SmallRng::from_entropy();
    let mut interval = tokio::time::interval(period);
    let mut asn: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                asn = asn.wrapping_add(1);
                tick(&state, &mut rng, asn);
            }
        }
    }
    debug!("traffic generator stopped");
}

fn tick(state: &ServiceState, rng: &mut SmallRng, asn: u32) {
    let links: Vec<_> = state.with_core(|core| {
        core.schedule
            .iter_links()
            .map(|(_, link)| (link.slotframe, link.timeslot, link.channel, link.options, link.target))
            .collect()
    });

    for (slotframe, timeslot, channel, options, target) in links {
        let peer = if target.is_broadcast() {
            synthetic_peer(timeslot, channel)
        } else {
            target
        };

        if options.contains(crate::core::schedule::LinkOptions::RX) {
            let frame = FrameMeta {
                slotframe,
                timeslot,
                channel,
                peer,
                rssi: rng.gen_range(-90..=-40),
                lqi: rng.gen_range(100..=255),
                asn,
            };
            state.on_rx(frame);
        }

        if options.contains(crate::core::schedule::LinkOptions::TX) {
            let frame = FrameMeta {
                slotframe,
                timeslot,
                channel,
                peer,
                rssi: rng.gen_range(-90..=-40),
                lqi: rng.gen_range(100..=255),
                asn,
            };
            let acked = rng.gen_bool(0.9);
            state.on_tx_complete(frame, TxOutcome { acked, attempts: if acked { 1 } else { 3 } });
            state.on_queue_changed(peer, rng.gen_range(0..=8));
        }
    }
}
