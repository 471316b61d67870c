use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ValidationError;

/// Kind of blockchain occurrence carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Transaction,
    Block,
    AccountChange,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Block => "block",
            Self::AccountChange => "account_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transaction" => Some(Self::Transaction),
            "block" => Some(Self::Block),
            "account_change" => Some(Self::AccountChange),
            _ => None,
        }
    }
}

/// A discrete blockchain event entering the detector. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub data: JsonValue,
}

impl Event {
    pub fn new(kind: EventKind, timestamp: i64, data: JsonValue) -> Self {
        Self {
            kind,
            timestamp,
            data,
        }
    }

    pub fn transaction(timestamp: i64, data: JsonValue) -> Self {
        Self::new(EventKind::Transaction, timestamp, data)
    }

    /// Build an event from untyped JSON, applying structural validation:
    /// non-empty known `type`, numeric `timestamp`, object `data`.
    pub fn from_json(raw: &JsonValue) -> Result<Self, ValidationError> {
        let kind_str = raw
            .get("type")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::EmptyType)?;
        let kind = EventKind::parse(kind_str)
            .ok_or_else(|| ValidationError::UnknownType(kind_str.to_string()))?;

        let timestamp = match raw.get("timestamp") {
            Some(JsonValue::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .ok_or(ValidationError::NonNumericTimestamp)?,
            _ => return Err(ValidationError::NonNumericTimestamp),
        };

        let data = raw.get("data").cloned().unwrap_or(JsonValue::Null);

        let event = Self {
            kind,
            timestamp,
            data,
        };
        event.validate()?;
        Ok(event)
    }

    /// Structural checks that still apply to an already-typed event.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timestamp < 0 {
            return Err(ValidationError::NegativeTimestamp(self.timestamp));
        }
        if !self.data.is_object() {
            return Err(ValidationError::DataNotObject);
        }
        Ok(())
    }

    pub fn is_transaction(&self) -> bool {
        self.kind == EventKind::Transaction
    }

    /// Originating account: `from`, falling back to `sender`.
    pub fn sender(&self) -> Option<&str> {
        self.data
            .get("from")
            .or_else(|| self.data.get("sender"))
            .and_then(JsonValue::as_str)
    }

    pub fn fee(&self) -> Option<f64> {
        self.number("fee")
    }

    /// Transferred amount: `amount`, falling back to `value`.
    pub fn amount(&self) -> Option<f64> {
        self.number("amount").or_else(|| self.number("value"))
    }

    /// Whether the payload reports a failed execution.
    pub fn is_failed(&self) -> bool {
        if self.data.get("status").and_then(JsonValue::as_str) == Some("failed") {
            return true;
        }
        if self.data.get("success").and_then(JsonValue::as_bool) == Some(false) {
            return true;
        }
        ["error", "err"]
            .iter()
            .any(|k| matches!(self.data.get(*k), Some(v) if !v.is_null()))
    }

    /// Read a numeric payload field. Numeric strings are accepted since
    /// RPC payloads often encode large integers as strings.
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.data.get(field)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_valid() {
        let raw = json!({"type": "transaction", "timestamp": 1_700_000_000_000i64, "data": {"fee": 5}});
        let event = Event::from_json(&raw).unwrap();
        assert_eq!(event.kind, EventKind::Transaction);
        assert_eq!(event.timestamp, 1_700_000_000_000);
        assert_eq!(event.fee(), Some(5.0));
    }

    #[test]
    fn test_from_json_string_timestamp() {
        let raw = json!({"type": "transaction", "timestamp": "yesterday", "data": {}});
        assert_eq!(
            Event::from_json(&raw),
            Err(ValidationError::NonNumericTimestamp)
        );
    }

    #[test]
    fn test_from_json_rejects_bad_shapes() {
        let empty_type = json!({"type": " ", "timestamp": 1, "data": {}});
        assert_eq!(Event::from_json(&empty_type), Err(ValidationError::EmptyType));

        let unknown = json!({"type": "vote", "timestamp": 1, "data": {}});
        assert!(matches!(
            Event::from_json(&unknown),
            Err(ValidationError::UnknownType(t)) if t == "vote"
        ));

        let array_data = json!({"type": "block", "timestamp": 1, "data": [1, 2]});
        assert_eq!(
            Event::from_json(&array_data),
            Err(ValidationError::DataNotObject)
        );

        let missing_data = json!({"type": "block", "timestamp": 1});
        assert_eq!(
            Event::from_json(&missing_data),
            Err(ValidationError::DataNotObject)
        );
    }

    #[test]
    fn test_payload_accessors() {
        let event = Event::transaction(
            10,
            json!({"sender": "abc", "value": "2500", "success": false}),
        );
        assert_eq!(event.sender(), Some("abc"));
        assert_eq!(event.amount(), Some(2500.0));
        assert!(event.is_failed());

        let ok = Event::transaction(10, json!({"from": "abc", "error": null}));
        assert!(!ok.is_failed());
        assert_eq!(ok.fee(), None);
    }
}
