// src/core/dispatch/json.rs

//! Wire JSON shapes (spec §6 "JSON shapes") and the conversions between
//! them and the domain types of `core::schedule`/`core::stats`/
//! `core::topology`. ASN values are emitted as a hex string; RSSI as a
//! signed decimal; all other metric values as unsigned decimal — §6's
//! value-encoding rule lives here, once, rather than scattered across
//! handlers.

use std::str::FromStr;

use serde_json::{Value, json};

use crate::core::addr::Addr;
use crate::core::arena::Handle;
use crate::core::errors::ServiceError;
use crate::core::schedule::{Link, LinkOptions, LinkType, Slotframe};
use crate::core::stats::engine::StatsConfigRequest;
use crate::core::stats::{EnhancedEntry, MetricKind, StatsEntry};
use crate::core::topology::{TopologySnapshot, VicinityEntry};

fn require_u64(value: &Value, field: &str) -> Result<u64, ServiceError> {
    value
        .get(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ServiceError::BadRequest(format!("missing or non-numeric field '{field}'")))
}

fn optional_u64(value: &Value, field: &str) -> Option<u64> {
    value.get(field).and_then(|v| v.as_u64())
}

fn require_addr(value: &Value, field: &str) -> Result<Addr, ServiceError> {
    let s = value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::BadRequest(format!("missing field '{field}'")))?;
    Addr::from_str(s).map_err(ServiceError::from)
}

fn optional_addr(value: &Value, field: &str) -> Result<Option<Addr>, ServiceError> {
    match value.get(field).and_then(|v| v.as_str()) {
        Some(s) => Ok(Some(Addr::from_str(s).map_err(ServiceError::from)?)),
        None => Ok(None),
    }
}

// --- Slotframe ---------------------------------------------------------

pub fn slotframe_to_json(sf: &Slotframe) -> Value {
    json!({ "fd": sf.handle, "ns": sf.size })
}

pub fn parse_slotframe_post(value: &Value) -> Result<(u32, u32), ServiceError> {
    let fd = require_u64(value, "fd")? as u32;
    let ns = require_u64(value, "ns")? as u32;
    Ok((fd, ns))
}

// --- Link ---------------------------------------------------------------

pub fn link_to_json(handle: Handle<Link>, link: &Link, stats: Vec<Value>) -> Value {
    json!({
        "cd": handle.encode(),
        "fd": link.slotframe,
        "so": link.timeslot,
        "co": link.channel,
        "lo": link.options.to_wire(),
        "lt": link.link_type.to_wire(),
        "tna": link.target.to_string(),
        "stats": stats,
    })
}

pub struct LinkPostFields {
    pub slotframe: u32,
    pub timeslot: u16,
    pub channel: u16,
    pub options: LinkOptions,
    pub link_type: LinkType,
    pub target: Addr,
}

pub fn parse_link_post(value: &Value) -> Result<LinkPostFields, ServiceError> {
    let slotframe = require_u64(value, "fd")? as u32;
    let timeslot = require_u64(value, "so")? as u16;
    let channel = require_u64(value, "co")? as u16;
    let options = LinkOptions::from_wire(require_u64(value, "lo")? as u8);
    let lt_raw = require_u64(value, "lt")? as u8;
    let link_type = LinkType::from_wire(lt_raw)
        .ok_or_else(|| ServiceError::BadRequest(format!("invalid link type {lt_raw}")))?;
    let target = require_addr(value, "tna")?;
    Ok(LinkPostFields {
        slotframe,
        timeslot,
        channel,
        options,
        link_type,
        target,
    })
}

// --- Statistics -----------------------------------------------------------

/// Encodes a metric value per §6: ASN as hex string, RSSI as signed
/// decimal, everything else as unsigned decimal.
fn metric_value_to_json(metric: MetricKind, value: i64) -> Value {
    match metric {
        MetricKind::Asn => json!(format!("{:x}", value as i64 as u32)),
        MetricKind::Rssi => json!(value),
        _ => json!(value.max(0) as u64),
    }
}

/// The base statistics-entry JSON (`tna` is the owning link's target
/// address).
pub fn stats_entry_to_json(handle: Handle<StatsEntry>, entry: &StatsEntry, link: &Link) -> Value {
    let _ = handle;
    json!({
        "id": entry.id(),
        "fd": link.slotframe,
        "so": link.timeslot,
        "co": link.channel,
        "metric": entry.metric(),
        "enable": if entry.enabled() { 1 } else { 0 },
        "tna": link.target.to_string(),
        "value": metric_value_to_json(entry.metric(), entry.value),
        "window": entry.window(),
    })
}

/// The enhanced per-peer sub-entry JSON: same id/metric/window as its
/// parent, `tna` is the observed peer rather than the link's own target
/// (spec §3 "Enhanced sub-entries").
pub fn enhanced_entry_to_json(
    entry: &StatsEntry,
    enhanced: &EnhancedEntry,
    link: &Link,
) -> Value {
    json!({
        "id": entry.id(),
        "fd": link.slotframe,
        "so": link.timeslot,
        "co": link.channel,
        "metric": entry.metric(),
        "enable": if entry.enabled() { 1 } else { 0 },
        "tna": enhanced.peer.to_string(),
        "value": metric_value_to_json(entry.metric(), enhanced.value),
        "window": entry.window(),
    })
}

pub fn parse_stats_post(value: &Value) -> Result<StatsConfigRequest, ServiceError> {
    let metric = match value.get("metric").and_then(|v| v.as_str()) {
        Some(s) => Some(
            MetricKind::from_str(s)
                .map_err(|_| ServiceError::BadRequest(format!("unknown metric '{s}'")))?,
        ),
        None => None,
    };
    let enable = value
        .get("enable")
        .and_then(|v| v.as_u64())
        .map(|v| v != 0)
        .unwrap_or(false);
    let window = optional_u64(value, "window").unwrap_or(0) as u16;
    Ok(StatsConfigRequest {
        slotframe: optional_u64(value, "fd").map(|v| v as u32),
        timeslot: optional_u64(value, "so").map(|v| v as u16),
        channel: optional_u64(value, "co").map(|v| v as u16),
        target: optional_addr(value, "tna")?,
        metric,
        id: optional_u64(value, "id").map(|v| v as u16),
        enable,
        window,
        value: None,
    })
}

// --- Topology / Vicinity / Queue ------------------------------------------

pub fn topology_to_json(snapshot: &TopologySnapshot) -> Value {
    json!({
        "parent": snapshot.parent.map(|a| a.to_string()),
        "children": snapshot.next_hops.iter().map(Addr::to_string).collect::<Vec<_>>(),
    })
}

pub fn vicinity_entry_to_json(entry: &VicinityEntry, now: u64) -> Value {
    json!({
        "tna": entry.peer.to_string(),
        "age": now.saturating_sub(entry.timestamp),
        "pheromone": entry.pheromone,
    })
}

pub fn queue_entry_to_json(peer: Addr, queue_len: u16) -> Value {
    json!({ "tna": peer.to_string(), "value": queue_len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asn_encodes_as_hex_string() {
        assert_eq!(metric_value_to_json(MetricKind::Asn, 255), json!("ff"));
    }

    #[test]
    fn rssi_encodes_as_signed_decimal() {
        assert_eq!(metric_value_to_json(MetricKind::Rssi, -60), json!(-60));
    }

    #[test]
    fn lqi_encodes_as_unsigned_decimal() {
        assert_eq!(metric_value_to_json(MetricKind::Lqi, 200), json!(200u64));
    }

    #[test]
    fn parse_slotframe_post_round_trips_through_to_json() {
        let (fd, ns) = parse_slotframe_post(&json!({"fd": 1, "ns": 101})).unwrap();
        let sf = Slotframe::new(fd, ns);
        assert_eq!(slotframe_to_json(&sf), json!({"fd": 1, "ns": 101}));
    }
}
