// Wire events and domain types for the realtime chat channel.
//
// Event names and payload shapes are the contract with the chat widget and
// the operator dashboard; renaming a variant here is a breaking change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Storage error: {0}")]
    Storage(String),
}

// ============================================================================
// PERSISTED RECORDS
// ============================================================================

/// A chat user as persisted by the store. Visitors are created on first
/// join; operators are provisioned out of band.
#[derive(Debug, Clone)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub message: String,
    pub message_type: String,
}

// ============================================================================
// EVENT SURFACE
// ============================================================================

fn default_message_type() -> String {
    "text".to_string()
}

/// Events received from a connected client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat {
        user_id: String,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        is_admin: bool,
        #[serde(default)]
        user_name: Option<String>,
        #[serde(default)]
        user_email: Option<String>,
    },
    SendMessage {
        #[serde(default)]
        conversation_id: String,
        #[serde(default)]
        sender_id: String,
        #[serde(default)]
        message: String,
        #[serde(default = "default_message_type")]
        message_type: String,
    },
    TypingStart {
        conversation_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },
    TypingStop {
        conversation_id: String,
    },
    MessageRead {
        message_id: i64,
    },
    AdminJoinConversation {
        conversation_id: String,
    },
    AdminLeaveConversation {
        conversation_id: String,
    },
}

/// A persisted message enriched with the resolved sender identity, as
/// delivered to every interested connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEvent {
    pub id: i64,
    pub conversation_id: String,
    pub sender_id: String,
    pub message: String,
    pub message_type: String,
    pub sender_name: String,
    pub is_admin: bool,
    pub created_at: String,
    pub status: String,
}

/// One online visitor, as reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineUser {
    pub user_id: String,
    pub conversation_id: String,
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(MessageEvent),
    UserTyping {
        user_name: Option<String>,
        conversation_id: String,
    },
    UserStopTyping {
        conversation_id: String,
    },
    OnlineUsers(Vec<OnlineUser>),
    UserOnline {
        user_id: String,
        conversation_id: String,
    },
    UserOffline {
        user_id: String,
    },
    ConversationUpdated {
        conversation_id: String,
    },
    Error {
        message: String,
    },
}

// ============================================================================
// PORTS
// ============================================================================

/// Trait for persisting chat users, conversations and messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a user if one with the same id does not already exist.
    async fn create_user(&self, user: NewUser) -> Result<(), ChatError>;

    async fn get_user_by_id(&self, id: &str) -> Result<Option<ChatUser>, ChatError>;

    /// Create a conversation if it does not already exist. Idempotent.
    async fn create_conversation(&self, id: &str, user_id: &str) -> Result<(), ChatError>;

    /// Persist a message and return its id.
    async fn create_message(&self, message: NewMessage) -> Result<i64, ChatError>;

    async fn update_message_status(&self, message_id: i64, status: &str) -> Result<(), ChatError>;

    /// Record whether a connection is online. Best-effort bookkeeping.
    async fn update_session_status(
        &self,
        connection_id: &str,
        is_online: bool,
    ) -> Result<(), ChatError>;
}

/// Outbound half of one client connection. Sending is best-effort and must
/// never block: a closed peer simply drops the event.
pub trait EventSink: Send + Sync {
    fn send(&self, event: ServerEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_names_match_wire_contract() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"join_chat","data":{"user_id":"u1","conversation_id":"c1","user_name":"Ada"}}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::JoinChat { is_admin: false, .. }));

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"conversation_id":"c1","sender_id":"u1","message":"hi"}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::SendMessage { message_type, .. } => assert_eq!(message_type, "text"),
            other => panic!("unexpected event: {:?}", other),
        }

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"admin_join_conversation","data":{"conversation_id":"c42"}}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::AdminJoinConversation { .. }));
    }

    #[test]
    fn test_server_event_names_match_wire_contract() {
        let json = serde_json::to_value(ServerEvent::UserOnline {
            user_id: "u1".to_string(),
            conversation_id: "c1".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "user_online");
        assert_eq!(json["data"]["conversation_id"], "c1");

        let json = serde_json::to_value(ServerEvent::OnlineUsers(vec![])).unwrap();
        assert_eq!(json["event"], "online_users");
        assert!(json["data"].as_array().unwrap().is_empty());

        let json = serde_json::to_value(ServerEvent::Error {
            message: "Missing required fields".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "error");
    }
}
