use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of characters of a non-API message kept in the event log.
pub const EVENT_DISPLAY_LEN: usize = 25;

// ──────────────────── Event Types ────────────────────

/// What triggered a notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    #[serde(rename = "API")]
    Api,
    Cron,
    Test,
    System,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Api => "API",
            EventSource::Cron => "Cron",
            EventSource::Test => "Test",
            EventSource::System => "System",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded notification attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub message: String,
    pub success: bool,
}

impl Event {
    /// Build an event stamped with the current time.
    ///
    /// Messages from any source other than `API` are cut to
    /// [`EVENT_DISPLAY_LEN`] characters with a trailing `...`.
    pub fn new(source: EventSource, message: &str, success: bool) -> Self {
        let message = if source == EventSource::Api {
            message.to_string()
        } else {
            truncate_display(message, EVENT_DISPLAY_LEN)
        };
        Self {
            timestamp: Utc::now(),
            source,
            message,
            success,
        }
    }
}

fn truncate_display(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}

// ──────────────────── Cron Types ────────────────────

/// A persisted recurring notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJob {
    /// Opaque unique ID, generated on creation.
    pub id: String,
    /// Message sent on every firing.
    pub message: String,
    /// Standard 5-field cron expression.
    pub schedule: String,
}

impl CronJob {
    /// Create a job with a freshly generated ID.
    pub fn new(message: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
            schedule: schedule.into(),
        }
    }
}

// ──────────────────── Delivery Types ────────────────────

/// Optional sender identity shown by the webhook receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            avatar_url: None,
        }
    }

    /// Identity used for every cron-originated delivery.
    pub fn cron() -> Self {
        Self::with_username("Nottif Cron")
    }

    /// Identity used by the test button.
    pub fn test() -> Self {
        Self::with_username("Nottif Test")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_source_serde() {
        assert_eq!(serde_json::to_string(&EventSource::Api).unwrap(), "\"API\"");
        assert_eq!(serde_json::to_string(&EventSource::Cron).unwrap(), "\"Cron\"");
        let parsed: EventSource = serde_json::from_str("\"System\"").unwrap();
        assert_eq!(parsed, EventSource::System);
    }

    #[test]
    fn test_api_message_not_truncated() {
        let long = "x".repeat(100);
        let event = Event::new(EventSource::Api, &long, true);
        assert_eq!(event.message, long);
    }

    #[test]
    fn test_cron_message_truncated() {
        let event = Event::new(EventSource::Cron, &"y".repeat(40), false);
        assert_eq!(event.message, format!("{}...", "y".repeat(25)));
        assert!(!event.success);
    }

    #[test]
    fn test_message_at_display_len_kept() {
        let exact = "z".repeat(EVENT_DISPLAY_LEN);
        let event = Event::new(EventSource::System, &exact, true);
        assert_eq!(event.message, exact);
    }

    #[test]
    fn test_truncate_multibyte() {
        let text = "é".repeat(30);
        let event = Event::new(EventSource::Test, &text, true);
        assert_eq!(event.message.chars().count(), EVENT_DISPLAY_LEN + 3);
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::new(EventSource::Test, "hi", true);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["source"], "Test");
        assert_eq!(value["message"], "hi");
        assert_eq!(value["success"], true);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_cron_job_ids_unique() {
        let a = CronJob::new("ping", "* * * * *");
        let b = CronJob::new("ping", "* * * * *");
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_cron_job_file_shape() {
        let json = r#"{"id":"abc","message":"hello","schedule":"0 9 * * *"}"#;
        let job: CronJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.id, "abc");
        assert_eq!(job.schedule, "0 9 * * *");
    }

    #[test]
    fn test_identity_omits_empty_fields() {
        let json = serde_json::to_string(&Identity::cron()).unwrap();
        assert_eq!(json, r#"{"username":"Nottif Cron"}"#);
    }
}
