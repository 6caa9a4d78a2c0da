use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A domain event as seen by the invalidation rules.
///
/// The payload is kept opaque. Only rule callbacks are expected to interpret `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_type:        String,
    #[serde(default)]
    pub data:              Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_root_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp:         Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata:          Option<Map<String, Value>>,
}

impl DomainEvent {
    pub fn new<S: Into<String>>(event_type: S, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            aggregate_root_id: None,
            timestamp: None,
            metadata: None,
        }
    }

    pub fn with_aggregate_root_id<S: Into<String>>(mut self, id: S) -> Self {
        self.aggregate_root_id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Stamp the event with the current time.
    pub fn now(self) -> Self {
        self.with_timestamp(Utc::now())
    }

    pub fn with_metadata<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.metadata.get_or_insert_with(Map::new).insert(key.into(), value);
        self
    }

    /// Look up a string in the payload by a JSON pointer, e.g. `/user/id`.
    pub fn data_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(Value::as_str)
    }

    /// Like [`data_str`](Self::data_str) but numbers and booleans are rendered too, which is handy for building keys.
    pub fn data_string(&self, pointer: &str) -> Option<String> {
        match self.data.pointer(pointer)? {
            Value::String(s) => Some(s.clone()),
            v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
            _ => None,
        }
    }
}
