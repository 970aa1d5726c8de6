// src/core/dispatch/selector.rs

//! Field-selector subresource parsing (spec §4.A, §6). REDESIGN FLAGS:
//! the source compares URI tail bytes against a closed set of labels;
//! here that's a sum type produced by a small parser, so handlers
//! pattern-match instead of string-comparing.

use std::str::FromStr;

use crate::core::errors::ServiceError;
use crate::core::stats::MetricKind;

/// A recognised field name appended to a resource's base URI
/// (`.../<field>`), or `None` when the URI stops at the resource base and
/// whole objects are wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector {
    Whole,
    Id,
    Frame,
    Slot,
    Channel,
    Option,
    Type,
    Tna,
    Stats,
    Age,
    Pheromone,
    Metric,
    Value,
    Enable,
    Window,
    /// One of the metric-kind labels (`rssi`, `lqi`, `etx`, `pdr`, `asn`)
    /// used as a subresource, e.g. `6top/stats/rssi`.
    MetricLabel(MetricKind),
}

impl FieldSelector {
    /// Parses the URI tail past the resource base. An empty tail (after
    /// stripping a leading `/`) is `Whole`.
    pub fn parse(tail: &str) -> Result<Self, ServiceError> {
        let tail = tail.trim_start_matches('/');
        if tail.is_empty() {
            return Ok(FieldSelector::Whole);
        }
        Ok(match tail {
            "id" => FieldSelector::Id,
            "frame" => FieldSelector::Frame,
            "slot" => FieldSelector::Slot,
            "channel" => FieldSelector::Channel,
            "option" => FieldSelector::Option,
            "type" => FieldSelector::Type,
            "tna" => FieldSelector::Tna,
            "stats" => FieldSelector::Stats,
            "age" => FieldSelector::Age,
            "pheromone" => FieldSelector::Pheromone,
            "metric" => FieldSelector::Metric,
            "value" => FieldSelector::Value,
            "enable" => FieldSelector::Enable,
            "window" => FieldSelector::Window,
            other => {
                if let Ok(kind) = MetricKind::from_str(other) {
                    FieldSelector::MetricLabel(kind)
                } else {
                    return Err(ServiceError::NotFound(format!(
                        "unknown subresource: {other}"
                    )));
                }
            }
        })
    }

    /// The JSON object key this selector projects, where applicable.
    pub fn json_key(self) -> Option<&'static str> {
        match self {
            FieldSelector::Whole => None,
            FieldSelector::Id => Some("id"),
            FieldSelector::Frame => Some("fd"),
            FieldSelector::Slot => Some("so"),
            FieldSelector::Channel => Some("co"),
            FieldSelector::Option => Some("lo"),
            FieldSelector::Type => Some("lt"),
            FieldSelector::Tna => Some("tna"),
            FieldSelector::Stats => Some("stats"),
            FieldSelector::Age => Some("age"),
            FieldSelector::Pheromone => Some("pheromone"),
            FieldSelector::Metric => Some("metric"),
            FieldSelector::Value => Some("value"),
            FieldSelector::Enable => Some("enable"),
            FieldSelector::Window => Some("window"),
            FieldSelector::MetricLabel(_) => Some("value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tail_is_whole() {
        assert_eq!(FieldSelector::parse("").unwrap(), FieldSelector::Whole);
        assert_eq!(FieldSelector::parse("/").unwrap(), FieldSelector::Whole);
    }

    #[test]
    fn known_field_names_parse() {
        assert_eq!(FieldSelector::parse("so").unwrap(), FieldSelector::Slot);
        assert_eq!(
            FieldSelector::parse("/window").unwrap(),
            FieldSelector::Window
        );
    }

    #[test]
    fn metric_labels_parse() {
        assert_eq!(
            FieldSelector::parse("rssi").unwrap(),
            FieldSelector::MetricLabel(MetricKind::Rssi)
        );
    }

    #[test]
    fn unknown_subresource_is_not_found() {
        assert!(matches!(
            FieldSelector::parse("bogus"),
            Err(ServiceError::NotFound(_))
        ));
    }
}
