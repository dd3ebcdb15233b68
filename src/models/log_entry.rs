use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    SearchRequest,
    SearchResult,
    DocumentImport,
    Error,
    System,
}

/// A durable event record. Never mutated after it has been queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,

    pub user_id: String,

    #[serde(rename = "type")]
    pub kind: LogType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl LogEntry {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError("userId must not be empty".to_string()));
        }
        if self.method.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ValidationError("method must not be empty".to_string()));
        }
        if let Some(cost) = self.cost_estimate
            && (!cost.is_finite() || cost < 0.0)
        {
            return Err(ValidationError(format!(
                "costEstimate must be a non-negative number, got {cost}"
            )));
        }
        Ok(())
    }
}

/// An event before it is stamped. The timestamp is always assigned by the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub user_id: String,
    pub kind: LogType,
    pub method: Option<String>,
    pub params: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub stack: Option<String>,
    pub cost_estimate: Option<f64>,
    pub tokens: Option<u64>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl LogEvent {
    pub fn new(user_id: impl Into<String>, kind: LogType) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            method: None,
            params: None,
            result: None,
            error: None,
            stack: None,
            cost_estimate: None,
            tokens: None,
            metadata: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn cost(mut self, cost_estimate: f64, tokens: u64) -> Self {
        self.cost_estimate = Some(cost_estimate);
        self.tokens = Some(tokens);
        self
    }

    /// Attach metadata; anything other than a JSON object is ignored.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = metadata {
            self.metadata = Some(map);
        }
        self
    }

    pub fn stamp(self, timestamp: DateTime<Utc>) -> LogEntry {
        LogEntry {
            timestamp,
            user_id: self.user_id,
            kind: self.kind,
            method: self.method,
            params: self.params,
            result: self.result,
            error: self.error,
            stack: self.stack,
            cost_estimate: self.cost_estimate,
            tokens: self.tokens,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wire_format() {
        let entry = LogEvent::new("alice", LogType::SearchResult)
            .method("search")
            .cost(0.0001, 12)
            .stamp(Utc::now());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "search_result");
        assert_eq!(value["userId"], "alice");
        assert_eq!(value["tokens"], 12);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        let now = Utc::now();
        assert!(LogEvent::new("", LogType::System).stamp(now).validate().is_err());
        assert!(
            LogEvent::new("bob", LogType::System)
                .method(" ")
                .stamp(now)
                .validate()
                .is_err()
        );
        assert!(
            LogEvent::new("bob", LogType::System)
                .cost(f64::NAN, 1)
                .stamp(now)
                .validate()
                .is_err()
        );
        assert!(
            LogEvent::new("bob", LogType::Error)
                .error("boom")
                .stamp(now)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_non_object_metadata_ignored() {
        let event = LogEvent::new("bob", LogType::System).metadata(serde_json::json!([1, 2]));
        assert!(event.metadata.is_none());
    }
}
