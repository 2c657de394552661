//! Aggregate view returned by the storage read path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Request metadata plus every downstream body collected for one request
/// identifier.
///
/// The reserved fields are serialized with a `_` prefix so backends that
/// store the record and the endpoint entries in one namespace (the Redis
/// hash) can tell them apart from endpoint names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseView {
    /// Request identifier the view was assembled for.
    #[serde(rename = "_id")]
    pub id: String,

    /// HTTP method of the original request.
    #[serde(rename = "_method", default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    /// URL string of the original request.
    #[serde(rename = "_url", default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// Endpoint name to response body, for every entry found in storage.
    ///
    /// An endpoint that never completed its round-trip is simply absent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, String>,
}

impl ResponseView {
    /// Builds a record-only view, as persisted before any fan-out happens.
    pub fn record(
        id: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            url: url.into(),
            results: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_without_results() {
        let view = ResponseView::record("abc", "GET", "/x?q=1");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"_id": "abc", "_method": "GET", "_url": "/x?q=1"})
        );
    }

    #[test]
    fn id_only_view_serializes_single_field() {
        let view = ResponseView {
            id: "abc".to_owned(),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({"_id": "abc"})
        );
    }

    #[test]
    fn record_round_trips_through_json() {
        let view = ResponseView::record("abc", "POST", "/");
        let bytes = serde_json::to_vec(&view).unwrap();
        let back: ResponseView = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, view);
    }
}
