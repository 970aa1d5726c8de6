// src/core/dispatch/mod.rs

//! Resource Registry & Dispatcher (component A, spec §4.A). Binds the
//! fixed URI surface to typed handlers, enforces content negotiation once
//! centrally, and applies the field-selector/query projection uniformly
//! across every GET. Grounded on `spineldb`'s `command_router::Router`
//! for the pipeline shape (negotiate, then dispatch, then count).

pub mod handlers;
pub mod json;
pub mod query;
pub mod resource;
pub mod selector;

pub use query::Query;
pub use resource::ResourceKind;
pub use selector::FieldSelector;

use crate::core::errors::{ServiceError, StatusCode};
use crate::core::protocol::{ACCEPTED_CONTENT_TYPE, Method};
use crate::core::state::ServiceState;

/// A handler's result, carrying just enough for the transport loop to
/// build a full protocol `Response` (message id/token live above this
/// layer, in the Arbiter/connection loop).
pub struct RouteResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RouteResponse {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    pub fn json(status: StatusCode, value: serde_json::Value) -> Self {
        Self {
            status,
            body: serde_json::to_vec(&value).expect("handler JSON always serialises"),
        }
    }
}

/// Enforces the one content-type this Service ever serves (spec §4.A).
/// Called once, before a request reaches the Arbiter or any handler.
pub fn negotiate(accept: Option<&str>) -> Result<(), ServiceError> {
    match accept {
        None => Ok(()),
        Some(a) if a.eq_ignore_ascii_case(ACCEPTED_CONTENT_TYPE) => Ok(()),
        Some(other) => Err(ServiceError::NotAcceptable(format!(
            "unsupported media type '{other}'"
        ))),
    }
}

/// Routes a fully reassembled request to its handler. `resource` and
/// `method` are already resolved by the caller (the Arbiter needs them
/// before the payload is fully reassembled, to form its lock tag), so
/// routing here is just the (resource, method) match plus the
/// field-selector parse.
pub fn dispatch(
    state: &ServiceState,
    resource: ResourceKind,
    method: Method,
    tail: &str,
    query: &Query,
    payload: &[u8],
) -> Result<RouteResponse, ServiceError> {
    let selector = FieldSelector::parse(tail)?;
    match (resource, method) {
        (ResourceKind::RplDag, Method::Get) => handlers::get_topology(state, selector, query),
        (ResourceKind::Nbrs, Method::Get) => handlers::get_nbrs(state, selector, query),
        (ResourceKind::SlotFrame, Method::Get) => handlers::get_slotframes(state, selector, query),
        (ResourceKind::SlotFrame, Method::Post) => handlers::post_slotframes(state, payload),
        (ResourceKind::SlotFrame, Method::Delete) => handlers::delete_slotframes(state, query),
        (ResourceKind::CellList, Method::Get) => handlers::get_links(state, selector, query),
        (ResourceKind::CellList, Method::Post) => handlers::post_links(state, payload),
        (ResourceKind::CellList, Method::Delete) => handlers::delete_links(state, query),
        (ResourceKind::Stats, Method::Get) => handlers::get_stats(state, selector, query),
        (ResourceKind::Stats, Method::Post) => handlers::post_stats(state, payload),
        (ResourceKind::Stats, Method::Delete) => handlers::delete_stats(state, query),
        (ResourceKind::Queue, Method::Get) => handlers::get_queue(state, selector, query),
        (ResourceKind::Vicinity, Method::Get) => handlers::get_vicinity(state, selector, query),
        (resource, method) => Err(ServiceError::NotImplemented(format!(
            "{method} is not supported on {}",
            resource.base_path()
        ))),
    }
}
