//! Message state machine: send, deliver, read, and catch-up.
//!
//! Transitions rely on the store's conditional updates, so they stay
//! monotonic under concurrent acknowledgments from multiple devices:
//! only forward transitions succeed, everything else is a quiet `None`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use courier_core::error::AppError;
use courier_core::result::AppResult;
use courier_core::types::{ChatId, MessageId, UserId};
use courier_database::repositories::message::NewMessage;
use courier_entity::message::{validate_content, Message, MessageKind};

use crate::store::{ChatStore, MessageStore};

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// The persisted message, status `sent`.
    pub message: Message,
    /// The other chat participant, for personal-room delivery.
    pub recipient: UserId,
}

/// One catch-up delivery notice, grouped per original sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryNotice {
    /// The sender whose messages were promoted.
    pub sender_id: UserId,
    /// The chat that was joined.
    pub chat_id: ChatId,
    /// Every message from this sender promoted in the batch.
    pub message_ids: Vec<MessageId>,
    /// Delivery timestamp shared by the batch.
    pub delivered_at: DateTime<Utc>,
}

/// Drives messages through their delivery lifecycle.
#[derive(Debug, Clone)]
pub struct DeliveryService {
    /// Chat lookups and summary updates.
    chats: Arc<dyn ChatStore>,
    /// Message persistence and transitions.
    messages: Arc<dyn MessageStore>,
}

impl DeliveryService {
    /// Create a new delivery service.
    pub fn new(chats: Arc<dyn ChatStore>, messages: Arc<dyn MessageStore>) -> Self {
        Self { chats, messages }
    }

    /// Persist a new message and update the chat summary.
    ///
    /// Rejections (unknown chat, sender not a participant, empty or
    /// over-length content) surface as errors for the send ack.
    /// Persistence completes before this returns, so the ack always
    /// refers to a durably stored message.
    pub async fn send(
        &self,
        sender: UserId,
        chat_id: ChatId,
        content: &str,
        kind: MessageKind,
    ) -> AppResult<SendOutcome> {
        let chat = self
            .chats
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| AppError::not_found("Chat not found or access denied"))?;

        // Also rejects non-participants: they have no "other" side.
        let recipient = chat
            .other_participant(sender)
            .ok_or_else(|| AppError::not_found("Chat not found or access denied"))?;

        let content = validate_content(content)?;

        let message = self
            .messages
            .create(NewMessage {
                chat_id,
                sender_id: sender,
                content,
                kind,
            })
            .await?;

        self.chats
            .touch_last_message(chat_id, message.id, message.created_at)
            .await?;

        Ok(SendOutcome { message, recipient })
    }

    /// Advance a message to `delivered`.
    ///
    /// Returns `None` without error when nothing happened: the actor is
    /// the sender, the message is unknown, or it already left `sent`.
    /// These are advisory client signals, not requests.
    pub async fn mark_delivered(
        &self,
        actor: UserId,
        message_id: MessageId,
    ) -> AppResult<Option<Message>> {
        self.messages
            .mark_delivered(message_id, actor, Utc::now())
            .await
    }

    /// Advance a message to `read`, back-filling `delivered_at` when the
    /// message skipped the delivered acknowledgment.
    pub async fn mark_read(
        &self,
        actor: UserId,
        message_id: MessageId,
    ) -> AppResult<Option<Message>> {
        self.messages.mark_read(message_id, actor, Utc::now()).await
    }

    /// Catch-up delivery on chat join: batch-promote every `sent`
    /// message authored by someone else, and emit one notice per
    /// distinct original sender rather than one per message.
    pub async fn catch_up(
        &self,
        recipient: UserId,
        chat_id: ChatId,
    ) -> AppResult<Vec<DeliveryNotice>> {
        let now = Utc::now();
        let promoted = self
            .messages
            .mark_chat_delivered(chat_id, recipient, now)
            .await?;

        Ok(group_by_sender(chat_id, &promoted, now))
    }
}

/// Group promoted messages into one notice per sender.
fn group_by_sender(
    chat_id: ChatId,
    messages: &[Message],
    delivered_at: DateTime<Utc>,
) -> Vec<DeliveryNotice> {
    let mut by_sender: BTreeMap<UserId, Vec<MessageId>> = BTreeMap::new();
    for message in messages {
        by_sender
            .entry(message.sender_id)
            .or_default()
            .push(message.id);
    }

    by_sender
        .into_iter()
        .map(|(sender_id, message_ids)| DeliveryNotice {
            sender_id,
            chat_id,
            message_ids,
            delivered_at,
        })
        .collect()
}
