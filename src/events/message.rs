use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::UserIdentity;

/// Events received from clients.
///
/// Room membership arrives with every event; the relay never caches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "NEW_MESSAGE", rename_all = "camelCase")]
    NewMessage {
        chat_id: String,
        members: Vec<String>,
        message: String,
    },
    #[serde(rename = "START_TYPING", rename_all = "camelCase")]
    StartTyping {
        chat_id: String,
        members: Vec<String>,
    },
    #[serde(rename = "STOP_TYPING", rename_all = "camelCase")]
    StopTyping {
        chat_id: String,
        members: Vec<String>,
    },
    #[serde(rename = "CHAT_JOINED", rename_all = "camelCase")]
    ChatJoined {
        user_id: String,
        members: Vec<String>,
    },
    #[serde(rename = "CHAT_LEAVED", rename_all = "camelCase")]
    ChatLeaved {
        user_id: String,
        members: Vec<String>,
    },
}

impl ClientEvent {
    /// Event tag, for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "NEW_MESSAGE",
            Self::StartTyping { .. } => "START_TYPING",
            Self::StopTyping { .. } => "STOP_TYPING",
            Self::ChatJoined { .. } => "CHAT_JOINED",
            Self::ChatLeaved { .. } => "CHAT_LEAVED",
        }
    }
}

/// Events emitted to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "NEW_MESSAGE", rename_all = "camelCase")]
    NewMessage {
        chat_id: String,
        message: TransientMessage,
    },
    #[serde(rename = "NEW_MESSAGE_ALERT", rename_all = "camelCase")]
    NewMessageAlert { chat_id: String },
    #[serde(rename = "START_TYPING", rename_all = "camelCase")]
    StartTyping { chat_id: String },
    #[serde(rename = "STOP_TYPING", rename_all = "camelCase")]
    StopTyping { chat_id: String },
    #[serde(rename = "ONLINE_USERS")]
    OnlineUsers(Vec<String>),
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
    #[serde(rename = "ERROR")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// In-memory broadcast payload for one message, never durable.
///
/// Carries a locally generated id and timestamp; the store assigns its own
/// canonical id to the durable record independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransientMessage {
    pub content: String,
    pub id: Uuid,
    pub sender: UserIdentity,
    pub chat: String,
    pub created_at: DateTime<Utc>,
}

impl TransientMessage {
    pub fn new(content: impl Into<String>, sender: UserIdentity, chat_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            id: Uuid::new_v4(),
            sender,
            chat: chat_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Outbound wire form: raw events are serialized at send time, while
/// fan-out to larger member sets shares one pre-serialized body.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Raw(ServerEvent),
    Preserialized(Arc<str>),
}

impl OutboundEvent {
    pub fn preserialized(event: &ServerEvent) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(event)?;
        Ok(Self::Preserialized(Arc::from(json.as_str())))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Raw(event) => serde_json::to_string(event),
            Self::Preserialized(json) => Ok(json.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_shape() {
        let json = r#"{"event":"NEW_MESSAGE","payload":{"chatId":"c1","members":["u1","u2"],"message":"hi"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::NewMessage {
                chat_id,
                members,
                message,
            } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(members, vec!["u1", "u2"]);
                assert_eq!(message, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_server_event_tags() {
        let alert = ServerEvent::NewMessageAlert {
            chat_id: "c1".to_string(),
        };
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains(r#""event":"NEW_MESSAGE_ALERT""#));
        assert!(json.contains(r#""chatId":"c1""#));

        let online = ServerEvent::OnlineUsers(vec!["u1".to_string()]);
        let json = serde_json::to_string(&online).unwrap();
        assert!(json.contains(r#""event":"ONLINE_USERS""#));
        assert!(json.contains(r#"["u1"]"#));
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        // Missing the required members field
        let json = r#"{"event":"NEW_MESSAGE","payload":{"chatId":"c1","message":"hi"}}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_transient_message_timestamp_is_iso() {
        let message = TransientMessage::new(
            "hello",
            UserIdentity::new("u1", "Alice"),
            "c1",
        );
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""createdAt":""#));
        assert!(json.contains(r#""sender":{"id":"u1","name":"Alice"}"#));
    }

    #[test]
    fn test_preserialized_round_trip() {
        let event = ServerEvent::Heartbeat;
        let raw = OutboundEvent::Raw(event.clone()).to_json().unwrap();
        let pre = OutboundEvent::preserialized(&event).unwrap().to_json().unwrap();
        assert_eq!(raw, pre);
    }
}
