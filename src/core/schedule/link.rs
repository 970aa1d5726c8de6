// src/core/schedule/link.rs

//! Link (scheduled cell) records and their bit-packed options (spec §3).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::addr::Addr;
use crate::core::arena::Handle;
use crate::core::stats::entry::StatsEntry;

bitflags! {
    /// The `lo` field: tx, rx, shared, timekeeping, one bit each.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct LinkOptions: u8 {
        const TX = 0b0001;
        const RX = 0b0010;
        const SHARED = 0b0100;
        const TIMEKEEPING = 0b1000;
    }
}

impl LinkOptions {
    pub fn from_wire(v: u8) -> Self {
        LinkOptions::from_bits_truncate(v)
    }

    pub fn to_wire(self) -> u8 {
        self.bits()
    }
}

/// The `lt` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Normal,
    Advertising,
}

impl LinkType {
    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(LinkType::Normal),
            1 => Some(LinkType::Advertising),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            LinkType::Normal => 0,
            LinkType::Advertising => 1,
        }
    }
}

/// A scheduled cell, owned by exactly one slotframe (spec §3).
#[derive(Debug, Clone)]
pub struct Link {
    /// The slotframe that owns this link, kept for reverse lookup only.
    pub slotframe: u32,
    pub timeslot: u16,
    pub channel: u16,
    pub options: LinkOptions,
    pub link_type: LinkType,
    pub target: Addr,
    pub stats: Vec<Handle<StatsEntry>>,
}

impl Link {
    pub fn is_broadcast(&self) -> bool {
        self.target.is_broadcast()
    }

    pub fn is_shared(&self) -> bool {
        self.options.contains(LinkOptions::SHARED)
    }
}
