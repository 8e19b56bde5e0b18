//! Payloads exchanged in in-dialog messages of the room call
//!
//! Bodies are JSON objects tagged by `type`: `signal` and `chat` envelopes
//! sent by peers, and `ConfbridgeTalking` notifications from the bridge.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::participant::ParticipantStatus;

pub const SIGNAL_TYPE_PARTICIPANT_UPDATE: &str = "signal/PARTICIPANT_UPDATE";
pub const SIGNAL_TYPE_PARTICIPANT_REQUEST: &str = "signal/PARTICIPANT_REQUEST";

/// Content type of every body the room sends
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Participant status signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Signal {
    /// A participant announces its status; never re-broadcast on receipt
    #[serde(rename = "signal/PARTICIPANT_UPDATE")]
    ParticipantUpdate { status: ParticipantStatus },

    /// Ask `call_id` (or everyone when absent) to broadcast its status
    #[serde(rename = "signal/PARTICIPANT_REQUEST")]
    ParticipantRequest {
        #[serde(rename = "callId", default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        origin: ParticipantStatus,
    },
}

impl Signal {
    pub fn update(status: ParticipantStatus) -> Self {
        Signal::ParticipantUpdate { status }
    }

    pub fn request_all(origin: ParticipantStatus) -> Self {
        Signal::ParticipantRequest { call_id: None, origin }
    }

    /// Whether a request addresses the participant `call_id`
    pub fn targets(&self, call_id: &str) -> bool {
        match self {
            Signal::ParticipantRequest { call_id: None, .. } => true,
            Signal::ParticipantRequest {
                call_id: Some(target), ..
            } => target == call_id,
            Signal::ParticipantUpdate { .. } => false,
        }
    }
}

/// Talking state of one bridge channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TalkingChannel {
    /// Participant call id
    pub id: String,
    pub talking_status: String,
}

impl TalkingChannel {
    pub fn is_talking(&self) -> bool {
        self.talking_status == "on"
    }
}

/// A parsed message body
#[derive(Debug, Clone, PartialEq)]
pub enum RoomMessage {
    Signal(Value),
    Chat(Value),
    Talking(TalkingChannel),
    Other,
}

/// Parse a message body. `None` for bodies that are not JSON.
pub fn parse_message(body: &str) -> Option<(Value, RoomMessage)> {
    let value: Value = serde_json::from_str(body).ok()?;

    let message = match value.get("type").and_then(Value::as_str) {
        Some("signal") => RoomMessage::Signal(value.get("content").cloned().unwrap_or(Value::Null)),
        Some("chat") => RoomMessage::Chat(value.get("content").cloned().unwrap_or(Value::Null)),
        Some("ConfbridgeTalking") => value
            .get("channels")
            .and_then(|channels| channels.get(0))
            .and_then(|channel| serde_json::from_value::<TalkingChannel>(channel.clone()).ok())
            .map(RoomMessage::Talking)
            .unwrap_or(RoomMessage::Other),
        _ => RoomMessage::Other,
    };

    Some((value, message))
}

pub fn signal_body(content: &Value) -> String {
    json!({ "type": "signal", "content": content }).to_string()
}

pub fn chat_body(content: &Value) -> String {
    json!({ "type": "chat", "content": content }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let origin = ParticipantStatus {
            call_id: "X".to_string(),
            ..ParticipantStatus::default()
        };
        let value = serde_json::to_value(Signal::request_all(origin)).expect("serialize");
        assert_eq!(value["type"], SIGNAL_TYPE_PARTICIPANT_REQUEST);
        assert_eq!(value["origin"]["callId"], "X");
        assert!(value.get("callId").is_none());

        let targeted: Signal = serde_json::from_value(json!({
            "type": SIGNAL_TYPE_PARTICIPANT_REQUEST,
            "callId": "Y",
            "origin": {"callId": "X"},
        }))
        .expect("deserialize");
        assert!(targeted.targets("Y"));
        assert!(!targeted.targets("X"));
    }

    #[test]
    fn unknown_signal_type_is_rejected() {
        let parsed = serde_json::from_value::<Signal>(json!({"type": "signal/SOMETHING"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn parses_envelopes() {
        let (_, message) = parse_message(&chat_body(&json!("hello"))).expect("json");
        assert_eq!(message, RoomMessage::Chat(json!("hello")));

        let (_, message) = parse_message(&signal_body(&json!({"type": "x"}))).expect("json");
        assert_eq!(message, RoomMessage::Signal(json!({"type": "x"})));

        let (value, message) = parse_message(
            r#"{"type":"ConfbridgeTalking","channels":[{"id":"Y","talking_status":"on"}]}"#,
        )
        .expect("json");
        assert_eq!(value["type"], "ConfbridgeTalking");
        match message {
            RoomMessage::Talking(channel) => {
                assert_eq!(channel.id, "Y");
                assert!(channel.is_talking());
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(parse_message("not json").is_none());
        assert_eq!(parse_message("{}").map(|(_, m)| m), Some(RoomMessage::Other));
    }
}
