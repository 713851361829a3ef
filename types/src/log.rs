use chrono::{DateTime, Utc};

/// Kinds of records handed to the event-logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionEnded,
    UserMessage,
    AssistantMessage,
    EmergencyCallTriggered,
    EmergencyCallCompleted,
    EmergencyCallFailed,
    Error,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    kind: EventKind,
    session_id: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl EventRecord {
    /// Creates a record stamped with the current time.
    pub fn new(kind: EventKind, session_id: &str) -> Self {
        Self {
            kind,
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_camel_case_keys() {
        let record = EventRecord::new(EventKind::EmergencyCallTriggered, "s-1")
            .with_data(serde_json::json!({ "entryId": 4 }));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "emergency_call_triggered");
        assert_eq!(json["sessionId"], "s-1");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["data"]["entryId"], 4);

        let json = serde_json::to_value(EventRecord::new(EventKind::SessionEnded, "s-1")).unwrap();
        assert!(json.get("data").is_none());
    }
}
