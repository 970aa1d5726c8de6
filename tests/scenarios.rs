// tests/scenarios.rs

//! End-to-end scenarios routed through the real dispatcher, arbiter, and
//! URI matcher together rather than one component at a time. Each test
//! name matches the scenario it exercises.

use serde_json::{Value, json};
use sixtopd::core::arbiter::{Arbiter, BlockOutcome, LockTag, RequestOrigin};
use sixtopd::core::dispatch::{self, Query, ResourceKind};
use sixtopd::core::errors::ServiceError;
use sixtopd::core::protocol::Method;
use sixtopd::core::state::{PoolCapacities, ServiceState};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

fn capacities() -> PoolCapacities {
    PoolCapacities {
        max_slotframes: 4,
        max_links: 16,
        max_stats_entries: 16,
        max_enhanced_entries: 16,
        max_proximates: 4,
    }
}

fn state() -> ServiceState {
    ServiceState::new(capacities(), 300, 10, 5, Duration::from_secs(5))
}

fn origin(message_id: u16) -> RequestOrigin {
    RequestOrigin {
        addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5683),
        message_id,
    }
}

fn route(uri_path: &str) -> (ResourceKind, &str) {
    ResourceKind::match_path(uri_path).expect("uri_path resolves to a known resource")
}

#[test]
fn scenario_1_create_list_delete_slotframe_through_the_dispatcher() {
    let state = state();
    let (resource, tail) = route("6top/slotFrame");

    let resp = dispatch::dispatch(
        &state,
        resource,
        Method::Post,
        tail,
        &Query::default(),
        br#"[{"fd":1,"ns":101}]"#,
    )
    .unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&resp.body).unwrap(), json!([1]));

    let resp = dispatch::dispatch(&state, resource, Method::Get, tail, &Query::default(), b"").unwrap();
    assert_eq!(
        serde_json::from_slice::<Value>(&resp.body).unwrap(),
        json!([{"fd": 1, "ns": 101}])
    );

    let query = Query(vec![("fd".to_string(), "1".to_string())]);
    dispatch::dispatch(&state, resource, Method::Delete, tail, &query, b"").unwrap();

    let resp = dispatch::dispatch(&state, resource, Method::Get, tail, &Query::default(), b"").unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&resp.body).unwrap(), json!([]));
}

#[test]
fn scenario_2_add_link_then_read_a_single_field_by_selector() {
    let state = state();
    let (sf_resource, sf_tail) = route("6top/slotFrame");
    dispatch::dispatch(
        &state,
        sf_resource,
        Method::Post,
        sf_tail,
        &Query::default(),
        br#"{"fd":1,"ns":101}"#,
    )
    .unwrap();

    let (cell_resource, _) = route("6top/cellList");
    dispatch::dispatch(
        &state,
        cell_resource,
        Method::Post,
        "",
        &Query::default(),
        json!({"fd":1,"so":5,"co":2,"lo":1,"lt":0,"tna":"0:1274:01:0101"})
            .to_string()
            .as_bytes(),
    )
    .unwrap();

    let (resource, tail) = route("6top/cellList/so");
    let query = Query(vec![("fd".to_string(), "1".to_string())]);
    let resp = dispatch::dispatch(&state, resource, Method::Get, tail, &query, b"").unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&resp.body).unwrap(), json!([5]));
}

#[test]
fn scenario_4_broadcast_etx_is_rejected_through_the_dispatcher() {
    let state = state();
    let (sf_resource, sf_tail) = route("6top/slotFrame");
    dispatch::dispatch(
        &state,
        sf_resource,
        Method::Post,
        sf_tail,
        &Query::default(),
        br#"{"fd":1,"ns":101}"#,
    )
    .unwrap();

    let (cell_resource, _) = route("6top/cellList");
    dispatch::dispatch(
        &state,
        cell_resource,
        Method::Post,
        "",
        &Query::default(),
        json!({"fd":1,"so":5,"co":2,"lo":1,"lt":0,"tna":"fdff:ffff:ff:ffff"})
            .to_string()
            .as_bytes(),
    )
    .unwrap();

    let (stats_resource, stats_tail) = route("6top/stats");
    let err = dispatch::dispatch(
        &state,
        stats_resource,
        Method::Post,
        stats_tail,
        &Query::default(),
        json!({"fd":1,"so":5,"co":2,"metric":"etx","enable":1,"window":16})
            .to_string()
            .as_bytes(),
    )
    .unwrap_err();
    assert!(matches!(err, ServiceError::BadRequest(_)));
}

#[test]
fn scenario_5_a_concurrent_get_is_rejected_while_a_multi_block_post_is_in_flight() {
    let mut arbiter = Arbiter::new(4096, 4);

    let stats_tag = LockTag {
        resource: ResourceKind::Stats,
        method: Method::Post,
        origin: origin(1),
    };
    let outcome = arbiter
        .accept_block(stats_tag, br#"{"fd":1,"so":5,"#, false)
        .unwrap();
    assert!(matches!(outcome, BlockOutcome::Continuation));

    let cell_list_tag = LockTag {
        resource: ResourceKind::CellList,
        method: Method::Get,
        origin: origin(2),
    };
    let err = arbiter.accept_block(cell_list_tag, b"", true).unwrap_err();
    assert!(matches!(err, ServiceError::Busy(_)));

    let outcome = arbiter
        .accept_block(stats_tag, br#""co":2,"metric":"rssi","enable":1,"window":16}"#, true)
        .unwrap();
    assert!(matches!(outcome, BlockOutcome::Complete(_)));
    assert!(!arbiter.is_locked());

    let resp = arbiter.accept_block(cell_list_tag, b"", true).unwrap();
    assert!(matches!(resp, BlockOutcome::Complete(_)));
}

#[test]
fn scenario_6_vicinity_eviction_through_the_mac_callback_surface() {
    use sixtopd::core::addr::Addr;
    use sixtopd::core::mac::{FrameMeta, MacCallbacks};

    let state = ServiceState::new(
        PoolCapacities {
            max_proximates: 4,
            ..capacities()
        },
        300,
        10,
        10,
        Duration::from_secs(5),
    );

    let frame = |peer: Addr| FrameMeta {
        slotframe: 0,
        timeslot: 0,
        channel: 0,
        peer,
        rssi: -60,
        lqi: 200,
        asn: 0,
    };

    for n in 1..=4u8 {
        state.on_rx(frame(Addr([n; 8])));
    }
    let before = state.with_core(|core| core.vicinity.iter().count());
    assert_eq!(before, 4);

    state.on_rx(frame(Addr([5; 8])));
    let after = state.with_core(|core| core.vicinity.iter().count());
    assert_eq!(after, 4);
    let has_fifth = state.with_core(|core| core.vicinity.iter().any(|e| e.peer == Addr([5; 8])));
    assert!(has_fifth);
}
