// src/core/stats/engine.rs

//! Statistics Engine (component D): configuration, deletion, and the two
//! MAC-callback update paths (spec §4.D). Grounded on
//! `original_source/.../plexi.c`'s `plexi_update_ewma_statistics` and the
//! stats POST/DELETE handlers for the exact EWMA/sentinel/cascade
//! semantics.

use crate::core::addr::Addr;
use crate::core::arena::{Arena, Handle};
use crate::core::errors::ServiceError;
use crate::core::schedule::{Link, LinkFilter, ScheduleStore};
use crate::core::stats::entry::{EnhancedEntry, MetricKind, StatsEntry};
use crate::core::stats::ewma::ewma_update;

/// A decoded `POST 6top/stats` body (spec §4.D, §6).
#[derive(Debug, Clone, Default)]
pub struct StatsConfigRequest {
    pub slotframe: Option<u32>,
    pub timeslot: Option<u16>,
    pub channel: Option<u16>,
    pub target: Option<Addr>,
    pub metric: Option<MetricKind>,
    pub id: Option<u16>,
    pub enable: bool,
    pub window: u16,
    pub value: Option<i64>,
}

/// A decoded `DELETE 6top/stats` filter set (spec §4.D "mirror-filtered").
#[derive(Debug, Clone, Default)]
pub struct StatsDeleteFilter {
    pub slotframe: Option<u32>,
    pub timeslot: Option<u16>,
    pub channel: Option<u16>,
    pub metric: Option<MetricKind>,
    pub id: Option<u16>,
    /// When set, only the enhanced sub-entry for this peer is removed.
    pub enhanced_peer: Option<Addr>,
}

pub struct StatisticsEngine {
    entries: Arena<StatsEntry>,
    enhanced: Arena<EnhancedEntry>,
}

impl StatisticsEngine {
    pub fn new(max_entries: usize, max_enhanced: usize) -> Self {
        Self {
            entries: Arena::with_capacity(max_entries),
            enhanced: Arena::with_capacity(max_enhanced),
        }
    }

    pub fn entry(&self, handle: Handle<StatsEntry>) -> Option<&StatsEntry> {
        self.entries.get(handle)
    }

    pub fn iter_entries(&self) -> impl Iterator<Item = (Handle<StatsEntry>, &StatsEntry)> {
        self.entries.iter()
    }

    pub fn enhanced_entry(&self, handle: Handle<EnhancedEntry>) -> Option<&EnhancedEntry> {
        self.enhanced.get(handle)
    }

    pub fn configure(
        &mut self,
        schedule: &mut ScheduleStore,
        req: StatsConfigRequest,
    ) -> Result<Vec<Handle<StatsEntry>>, ServiceError> {
        let metric = req
            .metric
            .ok_or_else(|| ServiceError::BadRequest("metric is required".into()))?;

        let filter = LinkFilter {
            slotframe: req.slotframe,
            timeslot: req.timeslot,
            channel: req.channel,
            target: req.target,
            link_id: None,
        };
        let link_handles: Vec<Handle<Link>> = schedule
            .find_links(&filter)
            .into_iter()
            .map(|(h, _)| h)
            .collect();
        if link_handles.is_empty() {
            return Err(ServiceError::NotFound("no link matches selector".into()));
        }

        let mut touched = Vec::with_capacity(link_handles.len());
        for link_handle in link_handles {
            let link = schedule.link(link_handle).expect("handle just resolved");
            if metric.is_tx_path() && link.is_broadcast() {
                return Err(ServiceError::BadRequest(
                    "etx/pdr statistics are illegal on a broadcast cell".into(),
                ));
            }

            let existing = link.stats.iter().copied().find(|h| {
                let e = self.entries.get(*h).expect("link stats handle must be live");
                e.metric() == metric && req.id.is_none_or(|id| e.id() == id)
            });

            if let Some(handle) = existing {
                let entry = self.entries.get_mut(handle).expect("resolved above");
                entry.set_enabled(req.enable);
                entry.set_window(req.window);
                if let Some(v) = req.value {
                    entry.set_value_direct(v);
                }
                touched.push(handle);
                continue;
            }

            if let Some(id) = req.id {
                let conflict = link.stats.iter().any(|h| {
                    let e = self.entries.get(*h).expect("link stats handle must be live");
                    e.id() == id && e.metric() != metric
                });
                if conflict {
                    return Err(ServiceError::BadRequest(format!(
                        "id {id} already in use on this link by a different metric"
                    )));
                }
            }

            let id = req.id.unwrap_or_else(|| next_free_id(&self.entries, &link.stats));
            let mut entry = StatsEntry::new(id, metric, req.enable, req.window, link_handle);
            if let Some(v) = req.value {
                entry.set_value_direct(v);
            }
            let handle = self
                .entries
                .insert(entry)
                .ok_or_else(|| ServiceError::Internal("statistics pool exhausted".into()))?;
            schedule
                .link_mut(link_handle)
                .expect("handle just resolved")
                .stats
                .push(handle);
            touched.push(handle);
        }
        Ok(touched)
    }

    pub fn delete(
        &mut self,
        schedule: &mut ScheduleStore,
        filter: StatsDeleteFilter,
    ) -> Result<usize, ServiceError> {
        let link_filter = LinkFilter {
            slotframe: filter.slotframe,
            timeslot: filter.timeslot,
            channel: filter.channel,
            target: None,
            link_id: None,
        };
        let link_handles: Vec<Handle<Link>> = schedule
            .find_links(&link_filter)
            .into_iter()
            .map(|(h, _)| h)
            .collect();

        let mut removed = 0usize;
        for link_handle in link_handles {
            let stats_handles = schedule
                .link(link_handle)
                .map(|l| l.stats.clone())
                .unwrap_or_default();
            for stats_handle in stats_handles {
                let matches = self.entries.get(stats_handle).is_some_and(|e| {
                    filter.metric.is_none_or(|m| e.metric() == m)
                        && filter.id.is_none_or(|id| e.id() == id)
                });
                if !matches {
                    continue;
                }
                if let Some(peer) = filter.enhanced_peer {
                    self.remove_enhanced_for_peer(stats_handle, peer);
                    removed += 1;
                    continue;
                }
                self.remove_entry(stats_handle);
                if let Some(link) = schedule.link_mut(link_handle) {
                    link.stats.retain(|h| *h != stats_handle);
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes a statistics entry and its whole enhanced chain. Used both
    /// by `delete` and by the Schedule Manager's cascade on link/slotframe
    /// removal (`purge_on_link`).
    fn remove_entry(&mut self, handle: Handle<StatsEntry>) {
        if let Some(entry) = self.entries.remove(handle) {
            for eh in entry.enhanced {
                self.enhanced.remove(eh);
            }
        }
    }

    fn remove_enhanced_for_peer(&mut self, entry_handle: Handle<StatsEntry>, peer: Addr) {
        let Some(entry) = self.entries.get_mut(entry_handle) else {
            return;
        };
        if let Some(pos) = entry
            .enhanced
            .iter()
            .position(|h| self.enhanced.get(*h).is_some_and(|e| e.peer == peer))
        {
            let eh = entry.enhanced.remove(pos);
            self.enhanced.remove(eh);
        }
    }

    /// Cascades a link (or slotframe) removal through its owned statistics
    /// chain. Resolves Open Question 2 of `SPEC_FULL.md` §9: this is the
    /// only trigger for purging enhanced entries, there being no external
    /// `plexi_purge_neighbor_statistics` caller in this scope.
    pub fn purge_on_link(&mut self, link: &Link) {
        for handle in &link.stats {
            self.remove_entry(*handle);
        }
    }

    /// Frame-reception callback (spec §4.D "Online update on frame
    /// reception"): RSSI/LQI EWMA, ASN max-wins latch, and the shared-link
    /// enhanced sub-entry update.
    pub fn on_rx(&mut self, schedule: &ScheduleStore, sf: u32, timeslot: u16, sender: Addr, rssi: i64, lqi: i64, asn: u32) {
        for (_, link) in schedule.find_link_by_slot(sf, timeslot) {
            let shared = link.is_shared();
            for &stats_handle in &link.stats {
                let Some(entry) = self.entries.get_mut(stats_handle) else {
                    continue;
                };
                let metric = entry.metric();
                match metric {
                    MetricKind::Rssi => entry.value = ewma_update(entry.value, rssi),
                    MetricKind::Lqi => entry.value = ewma_update(entry.value, lqi),
                    MetricKind::Asn => entry.value = entry.value.max(asn as i64),
                    MetricKind::Etx | MetricKind::Pdr => continue,
                }
                if shared {
                    self.update_enhanced(stats_handle, sender, metric, rssi, lqi, asn);
                }
            }
        }
    }

    fn update_enhanced(
        &mut self,
        entry_handle: Handle<StatsEntry>,
        peer: Addr,
        metric: MetricKind,
        rssi: i64,
        lqi: i64,
        asn: u32,
    ) {
        let existing = self.entries.get(entry_handle).and_then(|e| {
            e.enhanced
                .iter()
                .copied()
                .find(|h| self.enhanced.get(*h).is_some_and(|eh| eh.peer == peer))
        });
        let handle = match existing {
            Some(h) => h,
            None => {
                let Some(h) = self.enhanced.insert(EnhancedEntry::new(peer, entry_handle)) else {
                    // pool exhausted: the sample is silently dropped (§7).
                    return;
                };
                if let Some(entry) = self.entries.get_mut(entry_handle) {
                    entry.enhanced.push(h);
                }
                h
            }
        };
        if let Some(eh) = self.enhanced.get_mut(handle) {
            eh.value = match metric {
                MetricKind::Rssi => ewma_update(eh.value, rssi),
                MetricKind::Lqi => ewma_update(eh.value, lqi),
                MetricKind::Asn => eh.value.max(asn as i64),
                MetricKind::Etx | MetricKind::Pdr => eh.value,
            };
        }
    }

    /// Transmission-completion callback (spec §4.D "Online update on frame
    /// transmission completion"): ETX EWMA and the derived PDR transform,
    /// applied only on acknowledged frames.
    pub fn on_tx_complete(&mut self, schedule: &ScheduleStore, sf: u32, timeslot: u16, acked: bool, attempts: u16) {
        if !acked {
            return;
        }
        for (_, link) in schedule.find_link_by_slot(sf, timeslot) {
            for &stats_handle in &link.stats {
                let Some(entry) = self.entries.get_mut(stats_handle) else {
                    continue;
                };
                if entry.metric().is_tx_path() {
                    entry.apply_etx_sample(attempts as i64 * 256);
                }
            }
        }
    }
}

fn next_free_id(entries: &Arena<StatsEntry>, owned: &[Handle<StatsEntry>]) -> u16 {
    let mut used: Vec<u16> = owned
        .iter()
        .filter_map(|h| entries.get(*h).map(|e| e.id()))
        .collect();
    used.sort_unstable();
    let mut candidate = 0u16;
    for id in used {
        if id == candidate {
            candidate += 1;
        } else if id > candidate {
            break;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schedule::{LinkOptions, LinkType};

    fn setup() -> (ScheduleStore, StatisticsEngine, Handle<Link>) {
        let mut schedule = ScheduleStore::new(4, 16);
        schedule.add_slotframe(1, 101).unwrap();
        let link = schedule
            .add_link(1, 5, 2, LinkOptions::TX, LinkType::Normal, Addr::BROADCAST)
            .unwrap();
        (schedule, StatisticsEngine::new(16, 16), link)
    }

    #[test]
    fn configure_rejects_etx_on_broadcast_cell() {
        let (mut schedule, mut engine, _) = setup();
        let req = StatsConfigRequest {
            slotframe: Some(1),
            timeslot: Some(5),
            channel: Some(2),
            metric: Some(MetricKind::Etx),
            enable: true,
            window: 16,
            ..Default::default()
        };
        assert!(matches!(
            engine.configure(&mut schedule, req),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn configure_rejects_missing_metric() {
        let (mut schedule, mut engine, _) = setup();
        let req = StatsConfigRequest {
            slotframe: Some(1),
            timeslot: Some(5),
            channel: Some(2),
            enable: true,
            window: 16,
            ..Default::default()
        };
        assert!(matches!(
            engine.configure(&mut schedule, req),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn rssi_ewma_scenario_matches_spec() {
        let (mut schedule, mut engine, link) = setup();
        let req = StatsConfigRequest {
            slotframe: Some(1),
            timeslot: Some(5),
            channel: Some(2),
            metric: Some(MetricKind::Rssi),
            id: Some(1),
            enable: true,
            window: 16,
            ..Default::default()
        };
        let handles = engine.configure(&mut schedule, req).unwrap();
        assert_eq!(handles.len(), 1);
        let _ = link;

        engine.on_rx(&schedule, 1, 5, Addr::BROADCAST, -60, 0, 0);
        engine.on_rx(&schedule, 1, 5, Addr::BROADCAST, -62, 0, 0);
        engine.on_rx(&schedule, 1, 5, Addr::BROADCAST, -58, 0, 0);

        let entry = engine.entry(handles[0]).unwrap();
        assert_eq!(entry.value, -59);
    }

    #[test]
    fn purge_on_link_frees_the_pool() {
        let (mut schedule, mut engine, link) = setup();
        let req = StatsConfigRequest {
            slotframe: Some(1),
            timeslot: Some(5),
            channel: Some(2),
            metric: Some(MetricKind::Rssi),
            enable: true,
            window: 16,
            ..Default::default()
        };
        engine.configure(&mut schedule, req).unwrap();
        let removed_link = schedule.remove_link(1, link).unwrap();
        engine.purge_on_link(&removed_link);
        assert_eq!(engine.iter_entries().count(), 0);
    }

    #[test]
    fn delete_with_peer_removes_only_enhanced_subentry() {
        let mut schedule = ScheduleStore::new(4, 16);
        schedule.add_slotframe(1, 101).unwrap();
        let link = schedule
            .add_link(1, 5, 2, LinkOptions::TX | LinkOptions::SHARED, LinkType::Normal, Addr([1; 8]))
            .unwrap();
        let mut engine = StatisticsEngine::new(16, 16);
        let req = StatsConfigRequest {
            slotframe: Some(1),
            timeslot: Some(5),
            channel: Some(2),
            metric: Some(MetricKind::Rssi),
            enable: true,
            window: 16,
            ..Default::default()
        };
        let handles = engine.configure(&mut schedule, req).unwrap();
        let peer = Addr([2; 8]);
        engine.on_rx(&schedule, 1, 5, peer, -70, 0, 0);
        assert_eq!(engine.entry(handles[0]).unwrap().enhanced.len(), 1);

        let deleted = engine
            .delete(
                &mut schedule,
                StatsDeleteFilter {
                    slotframe: Some(1),
                    timeslot: Some(5),
                    enhanced_peer: Some(peer),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(engine.entry(handles[0]).unwrap().enhanced.is_empty());
        let _ = link;
    }
}
