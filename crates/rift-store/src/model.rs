//! Type definitions for imposters, stubs and response definitions.
//!
//! Predicates and responses are opaque protocol-specific JSON: the store
//! only looks at the handful of fields it needs (repeat behavior and the
//! proxy-recorded marker). Anything else an author writes is kept verbatim.

use crate::stubs::cycle::{HasRepeatBehavior, MAX_REPEAT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ============================================================================
// Stub Types
// ============================================================================

/// Stub definition (Mountebank-compatible)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stub {
    #[serde(default)]
    pub predicates: Vec<Value>,
    #[serde(default)]
    pub responses: Vec<Value>,
    /// Match records, only present when the imposter records matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Value>,
    /// Author fields such as `scenarioName`, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Stub {
    pub fn new(predicates: Vec<Value>, responses: Vec<Value>) -> Self {
        Self {
            predicates,
            responses,
            matches: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Stub handed back by `first()` when nothing matched
    pub fn synthetic_empty() -> Self {
        Self::new(Vec::new(), vec![empty_response()])
    }

    /// Copy of this stub without responses or matches (what a header stores)
    pub fn definition_only(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
            responses: Vec::new(),
            matches: Vec::new(),
            extra: self.extra.clone(),
        }
    }
}

/// The response served when no stub matched or a stub has no responses
pub fn empty_response() -> Value {
    json!({ "is": {} })
}

/// Read the repeat count of a response.
///
/// Supports `_behaviors: {"repeat": n}` and the array form
/// `behaviors: [{"repeat": n}]`. Anything other than a positive integer
/// counts as a single occurrence; counts above [`MAX_REPEAT`] saturate.
pub fn repeat_count(response: &Value) -> u32 {
    let behaviors = response
        .get("_behaviors")
        .or_else(|| response.get("behaviors"));

    let repeat = match behaviors {
        Some(Value::Object(map)) => map.get("repeat").and_then(Value::as_u64),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(|item| item.get("repeat").and_then(Value::as_u64)),
        _ => None,
    };

    repeat
        .filter(|r| *r > 0)
        .map_or(1, |r| u32::try_from(r).unwrap_or(u32::MAX).min(MAX_REPEAT))
}

impl HasRepeatBehavior for Value {
    fn get_repeat(&self) -> Option<u32> {
        Some(repeat_count(self))
    }
}

/// Whether a response was captured from live proxy traffic
pub fn is_recorded_response(response: &Value) -> bool {
    response
        .get("is")
        .and_then(|is| is.get("_proxyResponseTime"))
        .is_some_and(|time| !time.is_null())
}

/// Whether a response is a proxy definition
pub fn is_proxy_response(response: &Value) -> bool {
    response.get("proxy").is_some_and(|proxy| !proxy.is_null())
}

// ============================================================================
// Imposter Types
// ============================================================================

fn default_protocol() -> String {
    "http".to_string()
}

/// Imposter definition as stored and returned by the repositories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Imposter {
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub stubs: Vec<Stub>,
    /// Observed requests, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<Value>,
    /// Protocol-specific configuration (`name`, `recordRequests`, ...)
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl Imposter {
    pub fn new(port: u16, protocol: impl Into<String>) -> Self {
        Self {
            port,
            protocol: protocol.into(),
            stubs: Vec::new(),
            requests: Vec::new(),
            config: Map::new(),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.config
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn records_requests(&self) -> bool {
        self.flag("recordRequests")
    }

    pub fn records_matches(&self) -> bool {
        self.flag("recordMatches")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_count_defaults_to_one() {
        assert_eq!(repeat_count(&json!({"is": "first"})), 1);
        assert_eq!(repeat_count(&json!({"is": {}, "_behaviors": {}})), 1);
    }

    #[test]
    fn test_repeat_count_object_and_array_forms() {
        assert_eq!(
            repeat_count(&json!({"is": {}, "_behaviors": {"repeat": 3}})),
            3
        );
        assert_eq!(
            repeat_count(&json!({"is": {}, "behaviors": [{"wait": 10}, {"repeat": 2}]})),
            2
        );
    }

    #[test]
    fn test_repeat_count_saturates() {
        assert_eq!(
            repeat_count(&json!({"is": {}, "_behaviors": {"repeat": 4294967295u64}})),
            MAX_REPEAT
        );
        assert_eq!(
            repeat_count(&json!({"is": {}, "_behaviors": {"repeat": u64::MAX}})),
            MAX_REPEAT
        );
    }

    #[test]
    fn test_repeat_count_ignores_invalid_values() {
        assert_eq!(
            repeat_count(&json!({"is": {}, "_behaviors": {"repeat": 0}})),
            1
        );
        assert_eq!(
            repeat_count(&json!({"is": {}, "_behaviors": {"repeat": -2}})),
            1
        );
        assert_eq!(
            repeat_count(&json!({"is": {}, "_behaviors": {"repeat": "4"}})),
            1
        );
    }

    #[test]
    fn test_recorded_response_marker() {
        assert!(is_recorded_response(
            &json!({"is": {"body": "x", "_proxyResponseTime": 12}})
        ));
        assert!(is_recorded_response(
            &json!({"is": {"_proxyResponseTime": 0}})
        ));
        assert!(!is_recorded_response(&json!({"is": {"body": "x"}})));
        assert!(!is_recorded_response(
            &json!({"proxy": {"to": "http://localhost"}})
        ));
    }

    #[test]
    fn test_stub_keeps_extra_fields() {
        let stub: Stub = serde_json::from_value(json!({
            "scenarioName": "login",
            "responses": [{"is": {"statusCode": 200}}]
        }))
        .unwrap();
        assert!(stub.predicates.is_empty());
        assert_eq!(stub.extra.get("scenarioName"), Some(&json!("login")));

        let out = serde_json::to_value(&stub).unwrap();
        assert_eq!(out["scenarioName"], "login");
        assert!(out.get("matches").is_none());
    }

    #[test]
    fn test_imposter_config_fields_round_trip() {
        let imposter: Imposter = serde_json::from_value(json!({
            "port": 3000,
            "protocol": "tcp",
            "name": "orders",
            "recordRequests": true
        }))
        .unwrap();
        assert_eq!(imposter.protocol, "tcp");
        assert!(imposter.records_requests());
        assert!(!imposter.records_matches());
        assert_eq!(imposter.config.get("name"), Some(&json!("orders")));
    }

    #[test]
    fn test_imposter_protocol_default() {
        let imposter: Imposter = serde_json::from_value(json!({"port": 3000})).unwrap();
        assert_eq!(imposter.protocol, "http");
    }
}
