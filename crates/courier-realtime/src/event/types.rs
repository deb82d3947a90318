//! Inbound and outbound wire event definitions.
//!
//! Both directions are closed tagged enums; the dispatcher matches them
//! exhaustively, so adding a variant without a handler fails to compile.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_core::types::{ChatId, MessageId, UserId};
use courier_entity::message::{Message, MessageKind, MessageStatus};

/// Events sent by the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Open a chat: join its room and trigger catch-up delivery.
    JoinChat {
        /// Chat to join.
        chat_id: ChatId,
    },
    /// Close a chat: leave its room.
    LeaveChat {
        /// Chat to leave.
        chat_id: ChatId,
    },
    /// The user started typing in a chat.
    TypingStart {
        /// Chat being typed in.
        chat_id: ChatId,
    },
    /// The user stopped typing in a chat.
    TypingStop {
        /// Chat being typed in.
        chat_id: ChatId,
    },
    /// Send a message. Answered with a `send_ack` on the same connection.
    SendMessage {
        /// Target chat.
        chat_id: ChatId,
        /// Message body.
        content: String,
        /// Content kind, defaults to text.
        #[serde(default)]
        kind: MessageKind,
    },
    /// Acknowledge receipt of a message. Fire-and-forget.
    MarkDelivered {
        /// Message being acknowledged.
        message_id: MessageId,
    },
    /// Acknowledge reading a message. Fire-and-forget.
    MarkRead {
        /// Message being acknowledged.
        message_id: MessageId,
    },
    /// Refresh the presence TTL.
    Heartbeat,
    /// Query presence for a set of users. Answered with a
    /// `presence_snapshot`; unknown users are omitted.
    PresenceQuery {
        /// Users to look up.
        user_ids: Vec<UserId>,
    },
    /// Response to a server ping.
    Pong,
}

/// Events sent by the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Result of a `send_message` request.
    SendAck {
        /// Whether the message was persisted.
        success: bool,
        /// The persisted message on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<MessagePayload>,
        /// Failure description on error.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A new message, delivered to the chat room and the recipient's
    /// personal room.
    MessageNew {
        /// Message identifier.
        id: MessageId,
        /// Owning chat.
        chat_id: ChatId,
        /// Sending user.
        sender_id: UserId,
        /// Message body.
        content: String,
        /// Content kind.
        kind: MessageKind,
        /// Creation timestamp.
        created_at: DateTime<Utc>,
        /// Delivery status at broadcast time.
        status: MessageStatus,
    },
    /// A single message was acknowledged as delivered. Sent to the
    /// original sender's personal room only.
    MessageDelivered {
        /// The acknowledged message.
        message_id: MessageId,
        /// Delivery timestamp.
        delivered_at: DateTime<Utc>,
    },
    /// Catch-up delivery on chat join: one notice per original sender
    /// covering every message promoted in the batch.
    MessagesDelivered {
        /// The chat that was joined.
        chat_id: ChatId,
        /// All messages from this sender promoted in the batch.
        message_ids: Vec<MessageId>,
        /// Delivery timestamp shared by the batch.
        delivered_at: DateTime<Utc>,
    },
    /// A message was acknowledged as read. Sent to the original
    /// sender's personal room only.
    MessageRead {
        /// The acknowledged message.
        message_id: MessageId,
        /// Read timestamp.
        read_at: DateTime<Utc>,
    },
    /// Typing indicator, relayed to the chat room excluding the typist.
    Typing {
        /// Chat being typed in.
        chat_id: ChatId,
        /// Who is typing.
        user_id: UserId,
        /// True on start, false on stop.
        typing: bool,
    },
    /// A contact came online. Sent to contact peers only.
    UserOnline {
        /// The user who came online.
        user_id: UserId,
    },
    /// A contact went offline. Sent to contact peers only.
    UserOffline {
        /// The user who went offline.
        user_id: UserId,
        /// When they were last seen.
        last_seen: DateTime<Utc>,
    },
    /// Answer to a `presence_query`. Users with no known presence are
    /// omitted from the map.
    PresenceSnapshot {
        /// Presence per requested user.
        presence: HashMap<UserId, PresenceInfo>,
    },
    /// Server keepalive ping.
    Ping {
        /// Server timestamp in epoch milliseconds.
        timestamp: i64,
    },
    /// Error surfaced to the client.
    Error {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
}

impl OutboundEvent {
    /// Build a `message_new` broadcast from a persisted message.
    pub fn message_new(message: &Message) -> Self {
        Self::MessageNew {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            kind: message.kind,
            created_at: message.created_at,
            status: message.status,
        }
    }
}

/// Message body carried inside a `send_ack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message identifier.
    pub id: MessageId,
    /// Owning chat.
    pub chat_id: ChatId,
    /// Sending user.
    pub sender_id: UserId,
    /// Message body.
    pub content: String,
    /// Content kind.
    pub kind: MessageKind,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Delivery status.
    pub status: MessageStatus,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            kind: message.kind,
            created_at: message.created_at,
            status: message.status,
        }
    }
}

/// Presence answer entry: what peers may learn about a user.
///
/// Connection ids never leave the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceInfo {
    /// Whether the user has at least one live connection.
    pub online: bool,
    /// When the user was last seen.
    pub last_seen: DateTime<Utc>,
}
