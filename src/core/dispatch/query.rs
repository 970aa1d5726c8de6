// src/core/dispatch/query.rs

//! Query-string filtering (spec §4.A, §6 "Query keys"): multiple queries
//! AND together; a query whose key names a resource's unique identifier
//! collapses the result array into a single scalar/object.

/// The AND-ed set of key/value filters parsed from a request's query
/// string.
#[derive(Debug, Clone, Default)]
pub struct Query(pub Vec<(String, String)>);

impl Query {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True iff `item` (a JSON object) matches every filter in this query.
    /// A filter whose key is absent from `item` never matches.
    pub fn matches(&self, item: &serde_json::Value) -> bool {
        self.0.iter().all(|(k, v)| match item.get(k) {
            Some(found) => value_matches(found, v),
            None => false,
        })
    }

    /// True iff any of `unique_keys` was supplied, meaning the caller wants
    /// the result collapsed from an array to a single scalar/object (spec
    /// §4.A).
    pub fn names_unique_key(&self, unique_keys: &[&str]) -> bool {
        self.0.iter().any(|(k, _)| unique_keys.contains(&k.as_str()))
    }
}

fn value_matches(value: &serde_json::Value, query: &str) -> bool {
    match value {
        serde_json::Value::String(s) => s == query,
        serde_json::Value::Number(n) => n.to_string() == query,
        serde_json::Value::Bool(b) => b.to_string() == query,
        _ => false,
    }
}

/// Applies a query's AND-filter, an optional field-selector projection,
/// and unique-key collapse, uniformly over any resource's JSON listing
/// (spec §4.A "Field-selector semantics on GETs").
pub fn project(
    items: Vec<serde_json::Value>,
    field_key: Option<&'static str>,
    query: &Query,
    unique_keys: &[&str],
) -> serde_json::Value {
    let filtered: Vec<serde_json::Value> = items.into_iter().filter(|i| query.matches(i)).collect();

    let projected: Vec<serde_json::Value> = match field_key {
        None => filtered,
        Some(key) => filtered
            .into_iter()
            .filter_map(|item| item.get(key).cloned())
            .collect(),
    };

    if query.names_unique_key(unique_keys) {
        return projected
            .into_iter()
            .next()
            .unwrap_or(serde_json::Value::Null);
    }
    serde_json::Value::Array(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matches_ands_all_filters() {
        let query = Query(vec![
            ("fd".to_string(), "1".to_string()),
            ("so".to_string(), "5".to_string()),
        ]);
        assert!(query.matches(&json!({"fd": 1, "so": 5, "co": 2})));
        assert!(!query.matches(&json!({"fd": 1, "so": 6, "co": 2})));
    }

    #[test]
    fn project_collapses_on_unique_key() {
        let items = vec![json!({"fd": 1, "ns": 101}), json!({"fd": 2, "ns": 50})];
        let query = Query(vec![("fd".to_string(), "1".to_string())]);
        let result = project(items, None, &query, &["fd"]);
        assert_eq!(result, json!({"fd": 1, "ns": 101}));
    }

    #[test]
    fn project_without_unique_key_returns_array() {
        let items = vec![json!({"fd": 1, "ns": 101})];
        let query = Query::default();
        let result = project(items, None, &query, &["fd"]);
        assert_eq!(result, json!([{"fd": 1, "ns": 101}]));
    }

    #[test]
    fn project_with_field_selector_returns_value_array() {
        let items = vec![json!({"fd": 1, "so": 5}), json!({"fd": 2, "so": 6})];
        let query = Query::default();
        let result = project(items, Some("so"), &query, &["fd"]);
        assert_eq!(result, json!([5, 6]));
    }
}
