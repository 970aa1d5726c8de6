// src/core/topology/vicinity.rs

//! The pheromone-decay vicinity (neighbour freshness) tracker (spec §4.E,
//! §3 "Vicinity entry"). Pure logic over an explicit `now` tick so it can
//! be driven deterministically from tests; the server loop supplies real
//! time.

use crate::core::addr::Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VicinityEntry {
    pub peer: Addr,
    pub timestamp: u64,
    pub pheromone: i64,
}

pub struct VicinityTracker {
    entries: Vec<VicinityEntry>,
    capacity: usize,
}

impl VicinityTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VicinityEntry> {
        self.entries.iter()
    }

    /// Records contact with `peer` at `now`, per spec §4.E: refresh and
    /// bump an existing entry's pheromone (saturating); otherwise insert if
    /// room remains, evicting the weakest entry if not.
    pub fn touch(&mut self, peer: Addr, now: u64, chunk: i64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.peer == peer) {
            entry.timestamp = now;
            entry.pheromone = entry.pheromone.saturating_add(chunk);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some((idx, _)) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.pheromone)
            {
                self.entries.remove(idx);
            }
        }
        self.entries.push(VicinityEntry {
            peer,
            timestamp: now,
            pheromone: chunk,
        });
    }

    /// The periodic decay task (spec §4.E "Decay task"): entries untouched
    /// for longer than `window` lose `decay` pheromone; entries at or below
    /// zero are removed.
    pub fn decay(&mut self, now: u64, window: u64, decay: i64) {
        for entry in &mut self.entries {
            if now.saturating_sub(entry.timestamp) > window {
                entry.pheromone = entry.pheromone.saturating_sub(decay);
            }
        }
        self.entries.retain(|e| e.pheromone > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> Addr {
        Addr([n; 8])
    }

    #[test]
    fn touch_inserts_new_entry() {
        let mut tracker = VicinityTracker::new(4);
        tracker.touch(peer(1), 100, 10);
        assert_eq!(tracker.len(), 1);
        let e = tracker.iter().next().unwrap();
        assert_eq!(e.pheromone, 10);
        assert_eq!(e.timestamp, 100);
    }

    #[test]
    fn touch_refreshes_existing_entry() {
        let mut tracker = VicinityTracker::new(4);
        tracker.touch(peer(1), 100, 10);
        tracker.touch(peer(1), 200, 10);
        assert_eq!(tracker.len(), 1);
        let e = tracker.iter().next().unwrap();
        assert_eq!(e.pheromone, 20);
        assert_eq!(e.timestamp, 200);
    }

    #[test]
    fn eviction_removes_minimum_pheromone_scenario_6() {
        // spec §8 scenario 6: MAX_PROXIMATES=4, four peers known, a fifth
        // arrives.
        let mut tracker = VicinityTracker::new(4);
        tracker.touch(peer(1), 0, 5);
        tracker.touch(peer(2), 0, 20);
        tracker.touch(peer(3), 0, 15);
        tracker.touch(peer(4), 0, 30);
        tracker.touch(peer(5), 100, 10);
        assert_eq!(tracker.len(), 4);
        assert!(tracker.iter().all(|e| e.peer != peer(1)));
        let fifth = tracker.iter().find(|e| e.peer == peer(5)).unwrap();
        assert_eq!(fifth.pheromone, 10);
        assert_eq!(fifth.timestamp, 100);
    }

    #[test]
    fn decay_removes_entries_reaching_zero() {
        let mut tracker = VicinityTracker::new(4);
        tracker.touch(peer(1), 0, 5);
        tracker.decay(1000, 500, 10);
        assert!(tracker.is_empty());
    }

    #[test]
    fn decay_never_leaves_negative_pheromone() {
        let mut tracker = VicinityTracker::new(4);
        tracker.touch(peer(1), 0, 5);
        tracker.decay(1000, 500, 1000);
        assert!(tracker.iter().all(|e| e.pheromone > 0));
        assert!(tracker.is_empty());
    }

    #[test]
    fn decay_spares_recently_touched_entries() {
        let mut tracker = VicinityTracker::new(4);
        tracker.touch(peer(1), 900, 5);
        tracker.decay(1000, 500, 10);
        assert_eq!(tracker.len(), 1);
    }
}
