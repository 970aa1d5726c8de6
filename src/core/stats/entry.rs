// src/core/stats/entry.rs

//! Statistics entries and their per-peer "enhanced" sub-entries (spec §3,
//! §4.D).

use std::str::FromStr;

use strum_macros::{Display, EnumString};

use crate::core::addr::Addr;
use crate::core::arena::Handle;
use crate::core::schedule::Link;
use crate::core::stats::ewma::SENTINEL;
use crate::core::stats::meta::{ActiveMeta, StatsMetaAccess};

/// The five metric kinds (spec §6 field-selector labels).
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Rssi,
    Lqi,
    Etx,
    Pdr,
    Asn,
}

impl MetricKind {
    /// ETX/PDR are illegal on broadcast cells (spec §3, §4.D).
    pub fn is_tx_path(self) -> bool {
        matches!(self, MetricKind::Etx | MetricKind::Pdr)
    }

    pub(crate) fn to_tag(self) -> u16 {
        match self {
            MetricKind::Rssi => 0,
            MetricKind::Lqi => 1,
            MetricKind::Etx => 2,
            MetricKind::Pdr => 3,
            MetricKind::Asn => 4,
        }
    }

    pub(crate) fn from_tag(tag: u16) -> Self {
        match tag {
            0 => MetricKind::Rssi,
            1 => MetricKind::Lqi,
            2 => MetricKind::Etx,
            3 => MetricKind::Pdr,
            _ => MetricKind::Asn,
        }
    }
}

impl serde::Serialize for MetricKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for MetricKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MetricKind::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A per-link, per-metric statistics entry (spec §3).
///
/// `value` is the field callers read and serialise; for ETX/PDR entries it
/// is derived on every update from a hidden running average (`etx_accum`)
/// rather than stored twice — spec §4.D's "written each update to avoid
/// storing two fields".
#[derive(Debug, Clone)]
pub struct StatsEntry {
    meta: ActiveMeta,
    pub value: i64,
    etx_accum: i64,
    pub owner_link: Handle<Link>,
    pub enhanced: Vec<Handle<EnhancedEntry>>,
}

impl StatsEntry {
    pub fn new(id: u16, metric: MetricKind, enabled: bool, window: u16, owner_link: Handle<Link>) -> Self {
        Self {
            meta: ActiveMeta::new(id, metric, enabled, window),
            value: SENTINEL,
            etx_accum: SENTINEL,
            owner_link,
            enhanced: Vec::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.meta.id()
    }

    pub fn metric(&self) -> MetricKind {
        self.meta.metric()
    }

    pub fn enabled(&self) -> bool {
        self.meta.enabled()
    }

    pub fn window(&self) -> u16 {
        self.meta.window()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.meta.set_enabled(enabled);
    }

    pub fn set_window(&mut self, window: u16) {
        self.meta.set_window(window);
    }

    pub fn set_value_direct(&mut self, value: i64) {
        self.value = value;
        self.etx_accum = value;
    }

    /// Applies one EWMA sample to the hidden ETX accumulator and rewrites
    /// `value` per the ETX/PDR transform (spec §4.D).
    pub fn apply_etx_sample(&mut self, attempts_x256: i64) {
        self.etx_accum = crate::core::stats::ewma::ewma_update(self.etx_accum, attempts_x256);
        self.value = match self.metric() {
            MetricKind::Pdr if self.etx_accum > 0 => (100 * 256) / self.etx_accum,
            _ => self.etx_accum,
        };
    }
}

/// A per-peer sub-entry on a shared-slot statistics entry (spec §3).
#[derive(Debug, Clone)]
pub struct EnhancedEntry {
    pub peer: Addr,
    pub value: i64,
    pub owner_entry: Handle<StatsEntry>,
}

impl EnhancedEntry {
    pub fn new(peer: Addr, owner_entry: Handle<StatsEntry>) -> Self {
        Self {
            peer,
            value: SENTINEL,
            owner_entry,
        }
    }
}

