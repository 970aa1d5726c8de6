// src/core/events.rs

//! Observer / Notification (component F, spec §4.F). One
//! `tokio::sync::broadcast` channel per observable resource, mirroring
//! `spineldb`'s `core::pubsub::PubSubManager` channel-per-topic design and
//! `core::events::EventBus`'s publish-on-write hookup. The topology
//! resource additionally debounces: a change restarts a `DEBOUNCE_DELAY`
//! timer rather than notifying immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::trace;

use crate::core::dispatch::ResourceKind;
use crate::core::protocol::Notification;

/// Per-topic channel depth: deep enough to cover a burst of mutations
/// between two `Observe` deliveries on this node-local, single-consumer
/// service.
const CHANNEL_CAPACITY: usize = 64;

struct ResourceChannel {
    sender: broadcast::Sender<Notification>,
    sequence: Arc<AtomicU64>,
}

/// Debounced change notification to subscribed observers (spec §4.F).
/// Constructed once alongside the rest of `ServiceState`; every component
/// that mutates an observable resource calls `notify`/
/// `notify_topology_debounced` on it afterward.
pub struct ObserverHub {
    channels: HashMap<ResourceKind, ResourceChannel>,
    debounce_delay: Duration,
    debounce_generation: Arc<AtomicU64>,
}

const OBSERVABLE: [ResourceKind; 4] = [
    ResourceKind::RplDag,
    ResourceKind::Nbrs,
    ResourceKind::CellList,
    ResourceKind::Vicinity,
];

impl ObserverHub {
    pub fn new(debounce_delay: Duration) -> Self {
        let mut channels = HashMap::new();
        for kind in OBSERVABLE {
            let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
            channels.insert(
                kind,
                ResourceChannel {
                    sender,
                    sequence: Arc::new(AtomicU64::new(0)),
                },
            );
        }
        Self {
            channels,
            debounce_delay,
            debounce_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self, resource: ResourceKind) -> Option<broadcast::Receiver<Notification>> {
        self.channels.get(&resource).map(|c| c.sender.subscribe())
    }

    /// Immediate notification for every observable resource but the
    /// topology (`6top/nbrs`, `6top/cellList`, `mac/vicinity` — spec §6's
    /// periodic/immediate resources).
    pub fn notify(&self, resource: ResourceKind, body: Vec<u8>) {
        debug_assert_ne!(resource, ResourceKind::RplDag, "topology uses the debounced path");
        let Some(channel) = self.channels.get(&resource) else {
            return;
        };
        let sequence = channel.sequence.fetch_add(1, Ordering::Relaxed) as u32 + 1;
        if channel
            .sender
            .send(Notification {
                uri_path: resource.base_path(),
                sequence,
                body,
            })
            .is_err()
        {
            trace!(?resource, "no observers currently subscribed");
        }
    }

    /// Debounced topology notification (spec §4.F): bumps a generation
    /// counter and spawns a delayed publish; a later call before the delay
    /// elapses bumps the counter again, making the earlier spawn a no-op
    /// when it wakes (it observes a stale generation).
    pub fn notify_topology_debounced(&self, body: Vec<u8>) {
        let Some(channel) = self.channels.get(&ResourceKind::RplDag) else {
            return;
        };
        let sender = channel.sender.clone();
        let sequence = channel.sequence.clone();
        let generation_counter = self.debounce_generation.clone();
        let my_generation = generation_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.debounce_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation_counter.load(Ordering::SeqCst) != my_generation {
                return;
            }
            let seq = sequence.fetch_add(1, Ordering::Relaxed) as u32 + 1;
            let _ = sender.send(Notification {
                uri_path: ResourceKind::RplDag.base_path(),
                sequence: seq,
                body,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn immediate_notify_reaches_a_subscriber() {
        let hub = ObserverHub::new(Duration::from_millis(10));
        let mut rx = hub.subscribe(ResourceKind::CellList).unwrap();
        hub.notify(ResourceKind::CellList, b"[]".to_vec());
        let note = rx.recv().await.unwrap();
        assert_eq!(note.sequence, 1);
        assert_eq!(note.body, b"[]");
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_restarts_on_new_signal() {
        let hub = ObserverHub::new(Duration::from_millis(30));
        let mut rx = hub.subscribe(ResourceKind::RplDag).unwrap();
        hub.notify_topology_debounced(b"first".to_vec());
        tokio::time::advance(Duration::from_millis(15)).await;
        hub.notify_topology_debounced(b"second".to_vec());
        // advance past the first spawn's deadline (stale) and the second's.
        tokio::time::advance(Duration::from_millis(31)).await;
        let note = rx.recv().await.unwrap();
        assert_eq!(note.body, b"second");
        assert!(
            rx.try_recv().is_err(),
            "the superseded first debounce must never publish"
        );
    }
}
