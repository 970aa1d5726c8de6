// src/core/dispatch/handlers.rs

//! Per-resource handler functions (spec §4.A, §6). Each handler reads or
//! mutates `ServiceState` under its single lock, then hands the
//! field-selector/query projection off to `dispatch::query::project` so
//! none of them duplicate that logic.

use std::str::FromStr;

use serde_json::Value;

use crate::core::addr::Addr;
use crate::core::dispatch::json;
use crate::core::dispatch::query::{self, Query};
use crate::core::dispatch::selector::FieldSelector;
use crate::core::dispatch::{RouteResponse, ResourceKind};
use crate::core::errors::{ServiceError, StatusCode};
use crate::core::schedule::LinkFilter;
use crate::core::state::{unique_keys, ServiceState};
use crate::core::stats::engine::StatsDeleteFilter;

fn parse_u32(query: &Query, key: &str) -> Result<Option<u32>, ServiceError> {
    match query.get(key) {
        Some(s) => s
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ServiceError::BadRequest(format!("'{key}' must be an integer"))),
        None => Ok(None),
    }
}

fn parse_u16(query: &Query, key: &str) -> Result<Option<u16>, ServiceError> {
    match query.get(key) {
        Some(s) => s
            .parse::<u16>()
            .map(Some)
            .map_err(|_| ServiceError::BadRequest(format!("'{key}' must be an integer"))),
        None => Ok(None),
    }
}

fn parse_addr(query: &Query, key: &str) -> Result<Option<Addr>, ServiceError> {
    match query.get(key) {
        Some(s) => Addr::from_str(s).map(Some).map_err(ServiceError::from),
        None => Ok(None),
    }
}

fn link_filter_from_query(query: &Query) -> Result<LinkFilter, ServiceError> {
    Ok(LinkFilter {
        slotframe: parse_u32(query, "fd")?,
        timeslot: parse_u16(query, "so")?,
        channel: parse_u16(query, "co")?,
        link_id: parse_u32(query, "cd")?,
        target: parse_addr(query, "tna")?,
    })
}

// --- rpl/dag --------------------------------------------------------------

pub fn get_topology(
    state: &ServiceState,
    selector: FieldSelector,
    _query: &Query,
) -> Result<RouteResponse, ServiceError> {
    if selector != FieldSelector::Whole {
        return Err(ServiceError::NotFound(
            "rpl/dag has no field-selector subresources".into(),
        ));
    }
    Ok(RouteResponse {
        status: StatusCode::Content,
        body: state.topology_snapshot_body(),
    })
}

// --- 6top/nbrs --------------------------------------------------------------

pub fn get_nbrs(
    state: &ServiceState,
    selector: FieldSelector,
    query: &Query,
) -> Result<RouteResponse, ServiceError> {
    let addrs = state.routing.next_hop_addresses();
    let items: Vec<Value> = addrs
        .iter()
        .map(|a| serde_json::json!({ "tna": a.to_string() }))
        .collect();
    let projected = query::project(items, selector.json_key(), query, &[]);
    Ok(RouteResponse::json(StatusCode::Content, projected))
}

// --- 6top/slotFrame ---------------------------------------------------------

pub fn get_slotframes(
    state: &ServiceState,
    selector: FieldSelector,
    query: &Query,
) -> Result<RouteResponse, ServiceError> {
    let items: Vec<Value> = state.with_core(|core| {
        core.schedule
            .iter_slotframes()
            .map(json::slotframe_to_json)
            .collect()
    });
    let projected = query::project(
        items,
        selector.json_key(),
        query,
        unique_keys(ResourceKind::SlotFrame),
    );
    Ok(RouteResponse::json(StatusCode::Content, projected))
}

/// Accepts either a single slotframe object or an array of them (the
/// scenario in spec §8.1 posts an array; a single object is accepted too,
/// for symmetry with the corresponding GET).
fn as_item_array(payload: &[u8]) -> Result<Vec<Value>, ServiceError> {
    let value: Value = serde_json::from_slice(payload)?;
    match value {
        Value::Array(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

pub fn post_slotframes(state: &ServiceState, payload: &[u8]) -> Result<RouteResponse, ServiceError> {
    let items = as_item_array(payload)?;
    let mut created = Vec::with_capacity(items.len());
    state.with_core(|core| -> Result<(), ServiceError> {
        for item in &items {
            let (fd, ns) = json::parse_slotframe_post(item)?;
            core.schedule.add_slotframe(fd, ns)?;
            created.push(serde_json::json!(fd));
        }
        Ok(())
    })?;
    Ok(RouteResponse::json(
        StatusCode::Changed,
        Value::Array(created),
    ))
}

pub fn delete_slotframes(state: &ServiceState, query: &Query) -> Result<RouteResponse, ServiceError> {
    let fd = parse_u32(query, "fd")?
        .ok_or_else(|| ServiceError::BadRequest("slotframe delete requires 'fd'".into()))?;
    state.with_core(|core| -> Result<(), ServiceError> {
        let removed = core.schedule.remove_slotframe(fd)?;
        for (_, link) in &removed.links {
            core.stats.purge_on_link(link);
        }
        Ok(())
    })?;
    Ok(RouteResponse::empty(StatusCode::Deleted))
}

// --- 6top/cellList -----------------------------------------------------------

pub fn get_links(
    state: &ServiceState,
    selector: FieldSelector,
    query: &Query,
) -> Result<RouteResponse, ServiceError> {
    let filter = link_filter_from_query(query)?;
    let items: Vec<Value> = state.with_core(|core| {
        core.schedule
            .find_links(&filter)
            .into_iter()
            .map(|(handle, link)| {
                let stats: Vec<Value> = link
                    .stats
                    .iter()
                    .filter_map(|h| core.stats.entry(*h))
                    .map(|e| serde_json::json!(e.id()))
                    .collect();
                json::link_to_json(handle, link, stats)
            })
            .collect()
    });
    let projected = query::project(
        items,
        selector.json_key(),
        query,
        unique_keys(ResourceKind::CellList),
    );
    Ok(RouteResponse::json(StatusCode::Content, projected))
}

pub fn post_links(state: &ServiceState, payload: &[u8]) -> Result<RouteResponse, ServiceError> {
    let items = as_item_array(payload)?;
    let mut created = Vec::with_capacity(items.len());
    state.with_core(|core| -> Result<(), ServiceError> {
        for item in &items {
            let fields = json::parse_link_post(item)?;
            let handle = core.schedule.add_link(
                fields.slotframe,
                fields.timeslot,
                fields.channel,
                fields.options,
                fields.link_type,
                fields.target,
            )?;
            created.push(serde_json::json!(handle.encode()));
        }
        Ok(())
    })?;
    Ok(RouteResponse::json(
        StatusCode::Changed,
        Value::Array(created),
    ))
}

pub fn delete_links(state: &ServiceState, query: &Query) -> Result<RouteResponse, ServiceError> {
    let filter = link_filter_from_query(query)?;
    state.with_core(|core| -> Result<(), ServiceError> {
        let matched: Vec<_> = core
            .schedule
            .find_links(&filter)
            .into_iter()
            .map(|(h, l)| (h, l.slotframe))
            .collect();
        if matched.is_empty() {
            return Err(ServiceError::NotFound("no link matches selector".into()));
        }
        for (handle, sf) in matched {
            let removed = core.schedule.remove_link(sf, handle)?;
            core.stats.purge_on_link(&removed);
        }
        Ok(())
    })?;
    Ok(RouteResponse::empty(StatusCode::Deleted))
}

// --- 6top/stats ---------------------------------------------------------

pub fn get_stats(
    state: &ServiceState,
    selector: FieldSelector,
    query: &Query,
) -> Result<RouteResponse, ServiceError> {
    let items: Vec<Value> = state.with_core(|core| {
        let mut out = Vec::new();
        for (handle, entry) in core.stats.iter_entries() {
            let Some(link) = core.schedule.link(entry.owner_link) else {
                continue;
            };
            out.push(json::stats_entry_to_json(handle, entry, link));
            for enhanced_handle in &entry.enhanced {
                if let Some(enhanced) = core.stats.enhanced_entry(*enhanced_handle) {
                    out.push(json::enhanced_entry_to_json(entry, enhanced, link));
                }
            }
        }
        out
    });
    let projected = query::project(
        items,
        selector.json_key(),
        query,
        unique_keys(ResourceKind::Stats),
    );
    Ok(RouteResponse::json(StatusCode::Content, projected))
}

pub fn post_stats(state: &ServiceState, payload: &[u8]) -> Result<RouteResponse, ServiceError> {
    let value: Value = serde_json::from_slice(payload)?;
    let req = json::parse_stats_post(&value)?;
    let handles = state.with_core(|core| core.stats.configure(&mut core.schedule, req))?;
    let ids: Vec<Value> = state.with_core(|core| {
        handles
            .iter()
            .filter_map(|h| core.stats.entry(*h))
            .map(|e| serde_json::json!(e.id()))
            .collect()
    });
    Ok(RouteResponse::json(StatusCode::Changed, Value::Array(ids)))
}

pub fn delete_stats(state: &ServiceState, query: &Query) -> Result<RouteResponse, ServiceError> {
    let filter = StatsDeleteFilter {
        slotframe: parse_u32(query, "fd")?,
        timeslot: parse_u16(query, "so")?,
        channel: parse_u16(query, "co")?,
        metric: match query.get("metric") {
            Some(s) => Some(
                crate::core::stats::MetricKind::from_str(s)
                    .map_err(|_| ServiceError::BadRequest(format!("unknown metric '{s}'")))?,
            ),
            None => None,
        },
        id: parse_u16(query, "id")?,
        enhanced_peer: parse_addr(query, "tna")?,
    };
    let removed =
        state.with_core(|core| core.stats.delete(&mut core.schedule, filter))?;
    if removed == 0 {
        return Err(ServiceError::NotFound(
            "no statistics entry matches selector".into(),
        ));
    }
    Ok(RouteResponse::empty(StatusCode::Deleted))
}

// --- 6top/queue ---------------------------------------------------------

pub fn get_queue(
    state: &ServiceState,
    selector: FieldSelector,
    query: &Query,
) -> Result<RouteResponse, ServiceError> {
    let items: Vec<Value> = state.with_core(|core| {
        core.queue_lengths
            .iter()
            .map(|(peer, len)| json::queue_entry_to_json(*peer, *len))
            .collect()
    });
    let projected = query::project(items, selector.json_key(), query, &[]);
    Ok(RouteResponse::json(StatusCode::Content, projected))
}

// --- mac/vicinity -----------------------------------------------------------

pub fn get_vicinity(
    state: &ServiceState,
    selector: FieldSelector,
    query: &Query,
) -> Result<RouteResponse, ServiceError> {
    let now = crate::core::state::now_secs();
    let items: Vec<Value> = state.with_core(|core| {
        core.vicinity
            .iter()
            .map(|e| json::vicinity_entry_to_json(e, now))
            .collect()
    });
    let projected = query::project(items, selector.json_key(), query, &[]);
    Ok(RouteResponse::json(StatusCode::Content, projected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schedule::{LinkOptions, LinkType};
    use crate::core::state::PoolCapacities;

    fn test_state() -> ServiceState {
        ServiceState::new(
            PoolCapacities {
                max_slotframes: 4,
                max_links: 16,
                max_stats_entries: 16,
                max_enhanced_entries: 16,
                max_proximates: 4,
            },
            300,
            10,
            5,
            std::time::Duration::from_secs(5),
        )
    }

    #[test]
    fn create_list_delete_slotframe_scenario() {
        let state = test_state();
        let resp = post_slotframes(&state, br#"[{"fd":1,"ns":101}]"#).unwrap();
        assert_eq!(resp.status, StatusCode::Changed);
        assert_eq!(
            serde_json::from_slice::<Value>(&resp.body).unwrap(),
            serde_json::json!([1])
        );

        let resp = get_slotframes(&state, FieldSelector::Whole, &Query::default()).unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&resp.body).unwrap(),
            serde_json::json!([{"fd": 1, "ns": 101}])
        );

        let query = Query(vec![("fd".to_string(), "1".to_string())]);
        let resp = delete_slotframes(&state, &query).unwrap();
        assert_eq!(resp.status, StatusCode::Deleted);

        let resp = get_slotframes(&state, FieldSelector::Whole, &Query::default()).unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&resp.body).unwrap(),
            serde_json::json!([])
        );
    }

    #[test]
    fn cell_list_field_selector_scenario() {
        let state = test_state();
        post_slotframes(&state, br#"{"fd":1,"ns":101}"#).unwrap();
        let link_payload = serde_json::json!({
            "fd": 1, "so": 5, "co": 2, "lo": 1, "lt": 0, "tna": "0:1274:01:0101"
        });
        let resp = post_links(&state, link_payload.to_string().as_bytes()).unwrap();
        assert_eq!(resp.status, StatusCode::Changed);

        let query = Query(vec![("fd".to_string(), "1".to_string())]);
        let resp = get_links(&state, FieldSelector::Slot, &query).unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&resp.body).unwrap(),
            serde_json::json!([5])
        );
    }

    #[test]
    fn stats_etx_on_broadcast_is_rejected() {
        let state = test_state();
        post_slotframes(&state, br#"{"fd":1,"ns":101}"#).unwrap();
        let link_payload = serde_json::json!({
            "fd": 1, "so": 5, "co": 2, "lo": 1, "lt": 0, "tna": "fdff:ffff:ff:ffff"
        });
        post_links(&state, link_payload.to_string().as_bytes()).unwrap();
        let stats_payload = serde_json::json!({
            "fd": 1, "so": 5, "co": 2, "metric": "etx", "enable": 1, "window": 16
        });
        let err = post_stats(&state, stats_payload.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[test]
    fn delete_links_with_no_match_is_not_found() {
        let state = test_state();
        let query = Query(vec![("fd".to_string(), "99".to_string())]);
        assert!(matches!(
            delete_links(&state, &query),
            Err(ServiceError::NotFound(_))
        ));
    }
}
