// src/core/stats/meta.rs

//! Tag-packed metadata layer (DESIGN NOTES §9 "Tag-packed metadata"): the
//! `{id, metric, enable, window}` quadruple on a `StatsEntry`, stored either
//! as plain fields (`SparseMeta`) or packed into a single `u16`
//! (`DenseMeta`). Both implement `StatsMetaAccess`, so call sites never
//! branch on which layout is active — only the Cargo feature `dense-stats`
//! selects `ActiveMeta`.

use crate::core::stats::entry::MetricKind;

pub trait StatsMetaAccess: Copy {
    fn new(id: u16, metric: MetricKind, enabled: bool, window: u16) -> Self;
    fn id(&self) -> u16;
    fn set_id(&mut self, id: u16);
    fn metric(&self) -> MetricKind;
    fn set_metric(&mut self, metric: MetricKind);
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    fn window(&self) -> u16;
    fn set_window(&mut self, window: u16);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseMeta {
    id: u16,
    metric: MetricKind,
    enabled: bool,
    window: u16,
}

impl StatsMetaAccess for SparseMeta {
    fn new(id: u16, metric: MetricKind, enabled: bool, window: u16) -> Self {
        Self {
            id,
            metric,
            enabled,
            window,
        }
    }
    fn id(&self) -> u16 {
        self.id
    }
    fn set_id(&mut self, id: u16) {
        self.id = id;
    }
    fn metric(&self) -> MetricKind {
        self.metric
    }
    fn set_metric(&mut self, metric: MetricKind) {
        self.metric = metric;
    }
    fn enabled(&self) -> bool {
        self.enabled
    }
    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
    fn window(&self) -> u16 {
        self.window
    }
    fn set_window(&mut self, window: u16) {
        self.window = window;
    }
}

/// Packed layout: `window:8 | enabled:1 | metric:3 | id:4`, low bit first.
/// `id` and `window` are therefore range-checked to 4 and 8 bits
/// respectively — callers on this layout must keep client-assigned stats
/// ids below 16 and windows below 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseMeta(u16);

const ID_MASK: u16 = 0x0f;
const METRIC_SHIFT: u16 = 4;
const METRIC_MASK: u16 = 0x07;
const ENABLED_SHIFT: u16 = 7;
const WINDOW_SHIFT: u16 = 8;
const WINDOW_MASK: u16 = 0xff;

impl StatsMetaAccess for DenseMeta {
    fn new(id: u16, metric: MetricKind, enabled: bool, window: u16) -> Self {
        let mut m = DenseMeta(0);
        m.set_id(id);
        m.set_metric(metric);
        m.set_enabled(enabled);
        m.set_window(window);
        m
    }

    fn id(&self) -> u16 {
        self.0 & ID_MASK
    }

    fn set_id(&mut self, id: u16) {
        debug_assert!(id <= ID_MASK, "dense-stats id {id} exceeds 4 bits");
        self.0 = (self.0 & !ID_MASK) | (id & ID_MASK);
    }

    fn metric(&self) -> MetricKind {
        MetricKind::from_tag((self.0 >> METRIC_SHIFT) & METRIC_MASK)
    }

    fn set_metric(&mut self, metric: MetricKind) {
        let tag = metric.to_tag();
        self.0 = (self.0 & !(METRIC_MASK << METRIC_SHIFT)) | ((tag & METRIC_MASK) << METRIC_SHIFT);
    }

    fn enabled(&self) -> bool {
        (self.0 >> ENABLED_SHIFT) & 1 != 0
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.0 |= 1 << ENABLED_SHIFT;
        } else {
            self.0 &= !(1 << ENABLED_SHIFT);
        }
    }

    fn window(&self) -> u16 {
        (self.0 >> WINDOW_SHIFT) & WINDOW_MASK
    }

    fn set_window(&mut self, window: u16) {
        debug_assert!(
            window <= WINDOW_MASK,
            "dense-stats window {window} exceeds 8 bits"
        );
        self.0 = (self.0 & !(WINDOW_MASK << WINDOW_SHIFT)) | ((window & WINDOW_MASK) << WINDOW_SHIFT);
    }
}

#[cfg(feature = "dense-stats")]
pub type ActiveMeta = DenseMeta;
#[cfg(not(feature = "dense-stats"))]
pub type ActiveMeta = SparseMeta;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_meta_round_trips_all_fields() {
        let mut m = DenseMeta::new(9, MetricKind::Etx, true, 200);
        assert_eq!(m.id(), 9);
        assert_eq!(m.metric(), MetricKind::Etx);
        assert!(m.enabled());
        assert_eq!(m.window(), 200);
        m.set_enabled(false);
        m.set_metric(MetricKind::Rssi);
        assert!(!m.enabled());
        assert_eq!(m.metric(), MetricKind::Rssi);
        // fields not touched by the last two sets must be unaffected
        assert_eq!(m.id(), 9);
        assert_eq!(m.window(), 200);
    }

    #[test]
    fn sparse_meta_round_trips_all_fields() {
        let mut m = SparseMeta::new(9, MetricKind::Pdr, true, 16);
        m.set_window(32);
        assert_eq!(m.id(), 9);
        assert_eq!(m.metric(), MetricKind::Pdr);
        assert_eq!(m.window(), 32);
    }
}
