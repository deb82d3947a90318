//! Storage ports consumed by the realtime engine.
//!
//! The engine talks to the persistent store through these traits only;
//! the concrete repositories implement them below. Tests substitute
//! in-memory fakes with the same conditional-update semantics.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_core::result::AppResult;
use courier_core::types::{ChatId, MessageId, UserId};
use courier_database::repositories::message::NewMessage;
use courier_database::repositories::{
    ChatRepository, ContactRepository, MessageRepository, UserRepository,
};
use courier_entity::chat::Chat;
use courier_entity::message::Message;

/// Durable user lookups backing the presence cache.
#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// Read the durable presence fallback: `(online, last_seen)`.
    async fn last_known_presence(&self, user_id: UserId)
        -> AppResult<Option<(bool, DateTime<Utc>)>>;

    /// Mirror the cache-resident presence state into the durable store.
    async fn record_presence(
        &self,
        user_id: UserId,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> AppResult<()>;
}

/// Resolves which users may see a subject's presence.
#[async_trait]
pub trait ContactGraph: Send + Sync + std::fmt::Debug + 'static {
    /// Accepted peers in either direction, with blocked pairs removed.
    async fn peers_of(&self, user_id: UserId) -> AppResult<HashSet<UserId>>;
}

/// Chat lookups and summary updates.
#[async_trait]
pub trait ChatStore: Send + Sync + std::fmt::Debug + 'static {
    /// Find a chat by id.
    async fn find_by_id(&self, id: ChatId) -> AppResult<Option<Chat>>;

    /// Update the chat summary after a new message.
    async fn touch_last_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        at: DateTime<Utc>,
    ) -> AppResult<()>;
}

/// Message persistence and atomic status transitions.
///
/// The transition methods return `None` when the precondition failed
/// (wrong status, or the actor is the sender); precondition and mutation
/// must be one atomic step.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new message with status `sent`.
    async fn create(&self, new: NewMessage) -> AppResult<Message>;

    /// Advance `sent` → `delivered`.
    async fn mark_delivered(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>>;

    /// Advance to `read`, back-filling `delivered_at` when unset.
    async fn mark_read(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>>;

    /// Batch-promote every `sent` message in a chat not authored by
    /// `recipient` to `delivered`. Returns the promoted rows.
    async fn mark_chat_delivered(
        &self,
        chat_id: ChatId,
        recipient: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Message>>;
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn last_known_presence(
        &self,
        user_id: UserId,
    ) -> AppResult<Option<(bool, DateTime<Utc>)>> {
        UserRepository::last_known_presence(self, user_id).await
    }

    async fn record_presence(
        &self,
        user_id: UserId,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> AppResult<()> {
        UserRepository::record_presence(self, user_id, online, last_seen).await
    }
}

#[async_trait]
impl ContactGraph for ContactRepository {
    async fn peers_of(&self, user_id: UserId) -> AppResult<HashSet<UserId>> {
        ContactRepository::peers_of(self, user_id).await
    }
}

#[async_trait]
impl ChatStore for ChatRepository {
    async fn find_by_id(&self, id: ChatId) -> AppResult<Option<Chat>> {
        ChatRepository::find_by_id(self, id).await
    }

    async fn touch_last_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        ChatRepository::touch_last_message(self, chat_id, message_id, at).await
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn create(&self, new: NewMessage) -> AppResult<Message> {
        MessageRepository::create(self, new).await
    }

    async fn mark_delivered(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        MessageRepository::mark_delivered(self, id, actor, at).await
    }

    async fn mark_read(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        MessageRepository::mark_read(self, id, actor, at).await
    }

    async fn mark_chat_delivered(
        &self,
        chat_id: ChatId,
        recipient: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Message>> {
        MessageRepository::mark_chat_delivered(self, chat_id, recipient, at).await
    }
}
