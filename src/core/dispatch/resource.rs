// src/core/dispatch/resource.rs

//! The fixed URI surface (spec §6): five mutable/queryable resources plus
//! the read-only topology/queue resources, bound to typed handlers by the
//! Router.

use crate::core::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    RplDag,
    Nbrs,
    SlotFrame,
    CellList,
    Stats,
    Queue,
    Vicinity,
}

impl ResourceKind {
    pub const fn base_path(self) -> &'static str {
        match self {
            ResourceKind::RplDag => "rpl/dag",
            ResourceKind::Nbrs => "6top/nbrs",
            ResourceKind::SlotFrame => "6top/slotFrame",
            ResourceKind::CellList => "6top/cellList",
            ResourceKind::Stats => "6top/stats",
            ResourceKind::Queue => "6top/queue",
            ResourceKind::Vicinity => "mac/vicinity",
        }
    }

    /// Whether this resource can be subscribed to via the transport's
    /// observe extension (spec §6 "Obs" column).
    pub const fn is_observable(self) -> bool {
        matches!(
            self,
            ResourceKind::RplDag | ResourceKind::Nbrs | ResourceKind::CellList | ResourceKind::Vicinity
        )
    }

    const ALL: [ResourceKind; 7] = [
        ResourceKind::RplDag,
        ResourceKind::Nbrs,
        ResourceKind::SlotFrame,
        ResourceKind::CellList,
        ResourceKind::Stats,
        ResourceKind::Queue,
        ResourceKind::Vicinity,
    ];

    /// Matches a request's URI path against the fixed resource bases,
    /// returning the resource and the remaining tail (the field-selector
    /// subresource, spec §4.A).
    pub fn match_path(uri_path: &str) -> Result<(ResourceKind, &str), ServiceError> {
        let trimmed = uri_path.trim_start_matches('/');
        for kind in Self::ALL {
            if let Some(rest) = trimmed.strip_prefix(kind.base_path()) {
                return Ok((kind, rest));
            }
        }
        Err(ServiceError::NotFound(format!(
            "no resource matches uri path '{uri_path}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_base_path_with_no_tail() {
        let (kind, tail) = ResourceKind::match_path("6top/slotFrame").unwrap();
        assert_eq!(kind, ResourceKind::SlotFrame);
        assert_eq!(tail, "");
    }

    #[test]
    fn matches_base_path_with_field_selector_tail() {
        let (kind, tail) = ResourceKind::match_path("6top/cellList/so").unwrap();
        assert_eq!(kind, ResourceKind::CellList);
        assert_eq!(tail, "/so");
    }

    #[test]
    fn unknown_path_is_not_found() {
        assert!(ResourceKind::match_path("bogus/path").is_err());
    }
}
