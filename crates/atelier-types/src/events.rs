use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageKind, Notification, Transaction};

/// Events sent over the WebSocket gateway.
///
/// Room-scoped events go out on the chat namespace to every connection
/// subscribed to the room; `Notification` and `UnreadCount` go out on the
/// notifications namespace to all of one user's connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// Ack for a successful `join_room`
    RoomJoined { room_id: Uuid },

    /// A new message was posted to a room
    MessageReceived(Message),

    /// A member started or stopped typing
    UserTyping {
        room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// A member read the room up to now
    MessagesRead { user_id: Uuid, room_id: Uuid },

    /// A transaction was created in this room
    TransactionCreated(Transaction),

    /// A transaction in this room changed status
    TransactionUpdated(Transaction),

    /// A notification was delivered to this user
    Notification(Notification),

    /// This user's total unread notification count changed
    UnreadCount(u64),

    /// Inline failure for a rejected command, sent only to the issuing
    /// connection
    Error { message: String },
}

/// Commands sent FROM client TO server on the chat namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Subscribe this connection to a room (membership re-validated)
    JoinRoom { room_id: Uuid },

    /// Post a message to a room
    SendMessage {
        room_id: Uuid,
        content: String,
        #[serde(default, rename = "type")]
        kind: Option<MessageKind>,
        #[serde(default)]
        file_url: Option<String>,
    },

    /// Typing indicator, relayed to the other members of the room
    Typing { room_id: Uuid, is_typing: bool },

    /// Mark the room read up to now
    MarkRead { room_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn event_tags_match_the_wire_names() {
        let event = GatewayEvent::MessagesRead {
            user_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "messages_read");

        let event = GatewayEvent::UnreadCount(3);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "unread_count");
        assert_eq!(json["data"], 3);
    }

    #[test]
    fn message_received_embeds_the_message() {
        let msg = Message {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            kind: MessageKind::Text,
            content: "hello".into(),
            file_url: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(GatewayEvent::MessageReceived(msg.clone())).unwrap();
        assert_eq!(json["type"], "message_received");
        assert_eq!(json["data"]["content"], "hello");
        assert_eq!(json["data"]["type"], "TEXT");
    }

    #[test]
    fn commands_parse_from_client_json() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"send_message","data":{"room_id":"00000000-0000-0000-0000-000000000001","content":"hi"}}"#,
        )
        .unwrap();
        match cmd {
            GatewayCommand::SendMessage { content, kind, file_url, .. } => {
                assert_eq!(content, "hi");
                assert!(kind.is_none());
                assert!(file_url.is_none());
            }
            other => panic!("parsed wrong command: {other:?}"),
        }

        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"typing","data":{"room_id":"00000000-0000-0000-0000-000000000001","is_typing":true}}"#,
        )
        .unwrap();
        assert!(matches!(cmd, GatewayCommand::Typing { is_typing: true, .. }));
    }
}
