//! Defensive payload extraction shared by the consumers.
//!
//! Handlers must never fail on a malformed payload, so every lookup has a
//! fallback.

use keystone_events::DomainEvent;

/// Actor recorded when an event names no user.
pub const SYSTEM_USER: &str = "system";

/// Title used when an event names no title.
pub const UNTITLED: &str = "Untitled";

/// First non-empty string found at any of the JSON pointers.
pub(crate) fn first_str<'a>(event: &'a DomainEvent, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .filter_map(|p| event.payload_str(p))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

pub(crate) fn user_id(event: &DomainEvent) -> String {
    first_str(event, &["/userId", "/user/id", "/actorId"])
        .unwrap_or(SYSTEM_USER)
        .to_string()
}

/// The action segment of a topic (`"task.created"` -> `"created"`).
pub(crate) fn action(event: &DomainEvent) -> &str {
    event
        .event_type()
        .rsplit_once('.')
        .map(|(_, action)| action)
        .unwrap_or(event.event_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keystone_events::PartialDomainEvent;
    use serde_json::{Value, json};

    fn event(event_type: &str, payload: Value) -> DomainEvent {
        PartialDomainEvent::new(event_type, payload).complete("evt-1".into(), Utc::now())
    }

    #[test]
    fn user_id_falls_back_to_system() {
        assert_eq!(user_id(&event("user.login", json!({"userId": "u-1"}))), "u-1");
        assert_eq!(user_id(&event("user.login", json!({"user": {"id": "u-2"}}))), "u-2");
        assert_eq!(user_id(&event("user.login", json!({"userId": 42}))), SYSTEM_USER);
        assert_eq!(user_id(&event("user.login", json!({"userId": "  "}))), SYSTEM_USER);
        assert_eq!(user_id(&event("user.login", json!(null))), SYSTEM_USER);
        assert_eq!(user_id(&event("user.login", json!("not an object"))), SYSTEM_USER);
    }

    #[test]
    fn action_is_last_segment() {
        assert_eq!(action(&event("task.created", json!({}))), "created");
        assert_eq!(action(&event("task.sub.moved", json!({}))), "moved");
        assert_eq!(action(&event("ping", json!({}))), "ping");
    }
}
