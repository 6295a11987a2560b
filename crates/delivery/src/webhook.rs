//! Inbound provider event webhook parsing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use printshop_core::gateway::{DeliveryEvent, DeliveryEventType};

/// One raw entry from the provider's event webhook batch.
#[derive(Debug, Deserialize)]
pub struct ProviderEvent {
    #[serde(default)]
    pub sg_message_id: Option<String>,
    pub event: String,
    pub timestamp: i64,
}

/// Maps a provider batch to the events the store understands. Entries with an
/// unknown event type or no message id are dropped; a webhook batch is
/// best-effort by contract.
pub fn parse_events(body: &str) -> Result<Vec<DeliveryEvent>, serde_json::Error> {
    let raw: Vec<ProviderEvent> = serde_json::from_str(body)?;
    Ok(raw.into_iter().filter_map(into_event).collect())
}

fn into_event(raw: ProviderEvent) -> Option<DeliveryEvent> {
    let event_type = match raw.event.as_str() {
        "delivered" => DeliveryEventType::Delivered,
        "open" => DeliveryEventType::Opened,
        "click" => DeliveryEventType::Clicked,
        "bounce" | "dropped" => DeliveryEventType::Bounced,
        other => {
            debug!(event = other, "ignoring unhandled provider event type");
            return None;
        }
    };

    let message_id = raw.sg_message_id?;
    // The provider suffixes the accepted message id with filter metadata
    // after the first dot.
    let message_id = message_id.split('.').next().unwrap_or(&message_id).to_string();

    let timestamp = DateTime::<Utc>::from_timestamp(raw.timestamp, 0)?;
    Some(DeliveryEvent { message_id, event_type, timestamp })
}

#[cfg(test)]
mod tests {
    use printshop_core::gateway::DeliveryEventType;

    use super::parse_events;

    #[test]
    fn parses_known_events_and_strips_message_id_suffix() {
        let body = r#"[
            {"sg_message_id": "msg-1.filter001.16648.5515E0B88.0", "event": "delivered", "timestamp": 1764499200},
            {"sg_message_id": "msg-2", "event": "open", "timestamp": 1764502800},
            {"sg_message_id": "msg-3", "event": "click", "timestamp": 1764506400},
            {"sg_message_id": "msg-4", "event": "bounce", "timestamp": 1764510000}
        ]"#;

        let events = parse_events(body).expect("parse");
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].message_id, "msg-1");
        assert_eq!(events[0].event_type, DeliveryEventType::Delivered);
        assert_eq!(events[1].event_type, DeliveryEventType::Opened);
        assert_eq!(events[2].event_type, DeliveryEventType::Clicked);
        assert_eq!(events[3].event_type, DeliveryEventType::Bounced);
    }

    #[test]
    fn drops_unknown_event_types_and_entries_without_ids() {
        let body = r#"[
            {"sg_message_id": "msg-1", "event": "processed", "timestamp": 1764499200},
            {"event": "delivered", "timestamp": 1764499200},
            {"sg_message_id": "msg-2", "event": "delivered", "timestamp": 1764499200}
        ]"#;

        let events = parse_events(body).expect("parse");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_id, "msg-2");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(parse_events("{\"not\": \"an array\"}").is_err());
    }
}
