//! Event types and their wire framing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Closed set of event kinds pushed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    CharacterUpdated,
    CharacterDeleted,
    PartyCreated,
    PartyUpdated,
    PartyDeleted,
    PartyOptimized,
    RecommendationGenerated,
    UserJoined,
    UserLeft,
    SystemNotification,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharacterUpdated => "CHARACTER_UPDATED",
            Self::CharacterDeleted => "CHARACTER_DELETED",
            Self::PartyCreated => "PARTY_CREATED",
            Self::PartyUpdated => "PARTY_UPDATED",
            Self::PartyDeleted => "PARTY_DELETED",
            Self::PartyOptimized => "PARTY_OPTIMIZED",
            Self::RecommendationGenerated => "RECOMMENDATION_GENERATED",
            Self::UserJoined => "USER_JOINED",
            Self::UserLeft => "USER_LEFT",
            Self::SystemNotification => "SYSTEM_NOTIFICATION",
        }
    }

    /// Kind announced when cached data for `operation` changes.
    pub fn for_cache_operation(operation: &str) -> Self {
        let operation = operation.to_ascii_lowercase();
        if operation.starts_with("party") || operation.starts_with("parties") {
            Self::PartyUpdated
        } else if operation.starts_with("recommend") {
            Self::RecommendationGenerated
        } else {
            Self::CharacterUpdated
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable notification. Shared between subscribers as `Arc<Event>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub target: String,
    pub user_id: Option<String>,
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Delivered to every subscriber regardless of target filter.
    pub broadcast: bool,
}

impl Event {
    pub fn new(kind: EventKind, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            target: target.into(),
            user_id: None,
            payload: Map::new(),
            timestamp: Utc::now(),
            message: message.into(),
            broadcast: false,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    /// Whether a subscriber filtering on `filter` should receive this event.
    pub fn matches(&self, filter: Option<&str>) -> bool {
        self.broadcast || filter.map_or(true, |target| target == self.target)
    }
}

/// An event as written to a push connection: `id`, `event` and a JSON
/// `data` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub id: String,
    pub event: String,
    pub data: String,
}

impl From<&Event> for EventFrame {
    fn from(event: &Event) -> Self {
        let data = json!({
            "target": event.target,
            "userId": event.user_id,
            "payload": event.payload,
            "timestamp": event.timestamp,
            "message": event.message,
        });
        Self {
            id: event.id.to_string(),
            event: event.kind.as_str().to_string(),
            data: data.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_cache_operation() {
        assert_eq!(EventKind::for_cache_operation("character"), EventKind::CharacterUpdated);
        assert_eq!(EventKind::for_cache_operation("Party"), EventKind::PartyUpdated);
        assert_eq!(
            EventKind::for_cache_operation("recommendations"),
            EventKind::RecommendationGenerated
        );
        assert_eq!(EventKind::for_cache_operation("item"), EventKind::CharacterUpdated);
    }

    #[test]
    fn test_kind_serialization_matches_as_str() {
        for kind in [
            EventKind::CharacterUpdated,
            EventKind::PartyOptimized,
            EventKind::UserLeft,
            EventKind::SystemNotification,
        ] {
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }

    #[test]
    fn test_matches() {
        let event = Event::new(EventKind::PartyUpdated, "party:parties/1", "updated");
        assert!(event.matches(None));
        assert!(event.matches(Some("party:parties/1")));
        assert!(!event.matches(Some("party:parties/2")));

        let event = event.broadcast();
        assert!(event.matches(Some("party:parties/2")));
    }

    #[test]
    fn test_frame_layout() {
        let mut payload = Map::new();
        payload.insert("level".into(), json!(60));
        let event = Event::new(EventKind::CharacterUpdated, "character:characters/zed", "refreshed")
            .with_user("u-1")
            .with_payload(payload);

        let frame = EventFrame::from(&event);
        assert_eq!(frame.id, event.id.to_string());
        assert_eq!(frame.event, "CHARACTER_UPDATED");

        let data: Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(data["target"], "character:characters/zed");
        assert_eq!(data["userId"], "u-1");
        assert_eq!(data["payload"]["level"], 60);
        assert_eq!(data["message"], "refreshed");
        assert!(data["timestamp"].is_string());
    }
}
