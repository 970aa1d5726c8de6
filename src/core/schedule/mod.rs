// src/core/schedule/mod.rs

//! Schedule Manager (component C): CRUD on slotframes and links, with
//! cascading delete (spec §4.C). Grounded on `original_source/.../plexi.c`'s
//! slotframe/link POST/GET/DELETE handlers for the operation semantics and
//! on the teacher's `core::database` module for the "one lock guards the
//! whole store" discipline — see `ServiceState`.

pub mod link;
pub mod slotframe;

use indexmap::IndexMap;

use crate::core::addr::Addr;
use crate::core::arena::{Arena, Handle};
use crate::core::errors::ServiceError;

pub use link::{Link, LinkOptions, LinkType};
pub use slotframe::Slotframe;

/// Optional filters for link lookup/deletion (spec §4.C "Filtering
/// contract"). Every `Some` field narrows the match; all present filters
/// AND together.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub slotframe: Option<u32>,
    pub timeslot: Option<u16>,
    pub channel: Option<u16>,
    pub link_id: Option<u32>,
    pub target: Option<Addr>,
}

impl LinkFilter {
    fn matches(&self, link_handle: Handle<Link>, link: &Link) -> bool {
        if let Some(sf) = self.slotframe {
            if link.slotframe != sf {
                return false;
            }
        }
        if let Some(ts) = self.timeslot {
            if link.timeslot != ts {
                return false;
            }
        }
        if let Some(ch) = self.channel {
            if link.channel != ch {
                return false;
            }
        }
        if let Some(id) = self.link_id {
            if link_handle.encode() != id {
                return false;
            }
        }
        if let Some(addr) = self.target {
            if link.target != addr {
                return false;
            }
        }
        true
    }
}

/// The result of a cascading slotframe removal: the slotframe itself and
/// every link it owned, so the caller (`ServiceState`) can cascade the
/// statistics purge in turn.
pub struct RemovedSlotframe {
    pub slotframe: Slotframe,
    pub links: Vec<(Handle<Link>, Link)>,
}

pub struct ScheduleStore {
    slotframes: IndexMap<u32, Slotframe>,
    links: Arena<Link>,
    max_slotframes: usize,
}

impl ScheduleStore {
    pub fn new(max_slotframes: usize, max_links: usize) -> Self {
        Self {
            slotframes: IndexMap::new(),
            links: Arena::with_capacity(max_links),
            max_slotframes,
        }
    }

    pub fn add_slotframe(&mut self, handle: u32, size: u32) -> Result<(), ServiceError> {
        if self.slotframes.contains_key(&handle) {
            return Err(ServiceError::Exists(format!("slotframe {handle}")));
        }
        if self.slotframes.len() >= self.max_slotframes {
            return Err(ServiceError::NoMem("slotframe pool exhausted".into()));
        }
        self.slotframes.insert(handle, Slotframe::new(handle, size));
        Ok(())
    }

    /// Removes a slotframe and every link it owns. The caller is
    /// responsible for cascading the statistics purge for each returned
    /// link (`StatisticsEngine::purge_on_link`).
    pub fn remove_slotframe(&mut self, handle: u32) -> Result<RemovedSlotframe, ServiceError> {
        let slotframe = self
            .slotframes
            .shift_remove(&handle)
            .ok_or_else(|| ServiceError::NotFound(format!("slotframe {handle}")))?;
        let mut links = Vec::with_capacity(slotframe.links.len());
        for link_handle in &slotframe.links {
            if let Some(link) = self.links.remove(*link_handle) {
                links.push((*link_handle, link));
            }
        }
        Ok(RemovedSlotframe { slotframe, links })
    }

    pub fn slotframe(&self, handle: u32) -> Option<&Slotframe> {
        self.slotframes.get(&handle)
    }

    pub fn iter_slotframes(&self) -> impl Iterator<Item = &Slotframe> {
        self.slotframes.values()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_link(
        &mut self,
        sf_handle: u32,
        timeslot: u16,
        channel: u16,
        options: LinkOptions,
        link_type: LinkType,
        target: Addr,
    ) -> Result<Handle<Link>, ServiceError> {
        let slotframe = self
            .slotframes
            .get_mut(&sf_handle)
            .ok_or_else(|| ServiceError::NotFound(format!("slotframe {sf_handle}")))?;
        if timeslot as u32 >= slotframe.size {
            return Err(ServiceError::BadRequest(format!(
                "timeslot {timeslot} out of range for slotframe of size {}",
                slotframe.size
            )));
        }
        let link = Link {
            slotframe: sf_handle,
            timeslot,
            channel,
            options,
            link_type,
            target,
            stats: Vec::new(),
        };
        let handle = self
            .links
            .insert(link)
            .ok_or_else(|| ServiceError::NoMem("link pool exhausted".into()))?;
        slotframe.links.push(handle);
        Ok(handle)
    }

    /// Removes one link, returning its record so the caller can cascade the
    /// statistics purge.
    pub fn remove_link(
        &mut self,
        sf_handle: u32,
        link_handle: Handle<Link>,
    ) -> Result<Link, ServiceError> {
        let slotframe = self
            .slotframes
            .get_mut(&sf_handle)
            .ok_or_else(|| ServiceError::NotFound(format!("slotframe {sf_handle}")))?;
        let pos = slotframe
            .links
            .iter()
            .position(|h| *h == link_handle)
            .ok_or_else(|| ServiceError::NotFound(format!("link {}", link_handle.encode())))?;
        slotframe.links.remove(pos);
        self.links
            .remove(link_handle)
            .ok_or_else(|| ServiceError::NotFound(format!("link {}", link_handle.encode())))
    }

    pub fn link(&self, handle: Handle<Link>) -> Option<&Link> {
        self.links.get(handle)
    }

    pub fn link_mut(&mut self, handle: Handle<Link>) -> Option<&mut Link> {
        self.links.get_mut(handle)
    }

    pub fn iter_links(&self) -> impl Iterator<Item = (Handle<Link>, &Link)> {
        self.links.iter()
    }

    /// Filtered link lookup for GET/DELETE on `6top/cellList` (spec §4.C).
    pub fn find_links(&self, filter: &LinkFilter) -> Vec<(Handle<Link>, &Link)> {
        self.links
            .iter()
            .filter(|(h, l)| filter.matches(*h, l))
            .collect()
    }

    /// The (slotframe, timeslot) lookup the Statistics Engine performs on
    /// every MAC callback (spec §4.D, §5's linearisability requirement).
    pub fn find_link_by_slot(&self, sf_handle: u32, timeslot: u16) -> Vec<(Handle<Link>, &Link)> {
        self.links
            .iter()
            .filter(|(_, l)| l.slotframe == sf_handle && l.timeslot == timeslot)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> LinkOptions {
        LinkOptions::TX
    }

    #[test]
    fn add_slotframe_rejects_duplicate_handle() {
        let mut store = ScheduleStore::new(4, 16);
        store.add_slotframe(1, 101).unwrap();
        assert_eq!(
            store.add_slotframe(1, 50).unwrap_err(),
            ServiceError::Exists("slotframe 1".into())
        );
    }

    #[test]
    fn add_slotframe_nomem_when_full() {
        let mut store = ScheduleStore::new(1, 16);
        store.add_slotframe(1, 10).unwrap();
        assert!(matches!(
            store.add_slotframe(2, 10),
            Err(ServiceError::NoMem(_))
        ));
    }

    #[test]
    fn add_link_rejects_timeslot_out_of_range() {
        let mut store = ScheduleStore::new(4, 16);
        store.add_slotframe(1, 10).unwrap();
        let err = store
            .add_link(1, 10, 0, options(), LinkType::Normal, Addr::BROADCAST)
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[test]
    fn remove_slotframe_cascades_links() {
        let mut store = ScheduleStore::new(4, 16);
        store.add_slotframe(1, 10).unwrap();
        let l1 = store
            .add_link(1, 5, 2, options(), LinkType::Normal, Addr::BROADCAST)
            .unwrap();
        let removed = store.remove_slotframe(1).unwrap();
        assert_eq!(removed.links.len(), 1);
        assert_eq!(removed.links[0].0, l1);
        assert!(store.link(l1).is_none());
        assert!(store.slotframe(1).is_none());
    }

    #[test]
    fn remove_link_updates_slotframe_order() {
        let mut store = ScheduleStore::new(4, 16);
        store.add_slotframe(1, 10).unwrap();
        let l1 = store
            .add_link(1, 1, 0, options(), LinkType::Normal, Addr::BROADCAST)
            .unwrap();
        let l2 = store
            .add_link(1, 2, 0, options(), LinkType::Normal, Addr::BROADCAST)
            .unwrap();
        store.remove_link(1, l1).unwrap();
        let links: Vec<_> = store.slotframe(1).unwrap().links.clone();
        assert_eq!(links, vec![l2]);
    }

    #[test]
    fn find_links_filters_by_slotframe_and_timeslot() {
        let mut store = ScheduleStore::new(4, 16);
        store.add_slotframe(1, 10).unwrap();
        store.add_slotframe(2, 10).unwrap();
        store
            .add_link(1, 5, 2, options(), LinkType::Normal, Addr::BROADCAST)
            .unwrap();
        store
            .add_link(2, 5, 2, options(), LinkType::Normal, Addr::BROADCAST)
            .unwrap();
        let filter = LinkFilter {
            slotframe: Some(1),
            timeslot: Some(5),
            ..Default::default()
        };
        let found = store.find_links(&filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.slotframe, 1);
    }

    #[test]
    fn round_trip_add_remove_preserves_pool_state() {
        let mut store = ScheduleStore::new(4, 16);
        store.add_slotframe(1, 10).unwrap();
        let l1 = store
            .add_link(1, 1, 0, options(), LinkType::Normal, Addr::BROADCAST)
            .unwrap();
        store.remove_link(1, l1).unwrap();
        store.remove_slotframe(1).unwrap();
        assert_eq!(store.iter_slotframes().count(), 0);
        assert_eq!(store.iter_links().count(), 0);
        // pool must accept fresh inserts again
        store.add_slotframe(1, 10).unwrap();
    }
}
