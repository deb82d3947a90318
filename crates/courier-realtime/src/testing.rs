//! Shared test doubles for the realtime engine.
//!
//! The in-memory stores mirror the conditional-update semantics of the
//! real repositories: a transition whose precondition fails returns
//! `None` instead of mutating.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_cache::CacheManager;
use courier_core::config::cache::MemoryCacheConfig;
use courier_core::result::AppResult;
use courier_core::types::{ChatId, MessageId, UserId};
use courier_database::repositories::message::NewMessage;
use courier_entity::chat::Chat;
use courier_entity::message::{Message, MessageStatus};

use crate::store::{ChatStore, ContactGraph, MessageStore, UserDirectory};

/// A cache manager backed by the in-memory provider.
pub(crate) fn memory_cache() -> Arc<CacheManager> {
    let config = MemoryCacheConfig {
        max_capacity: 1000,
        time_to_live_seconds: 300,
    };
    let provider = courier_cache::memory::MemoryCacheProvider::new(&config, 300);
    Arc::new(CacheManager::from_provider(Arc::new(provider)))
}

/// Durable user directory fake.
#[derive(Debug, Default)]
pub(crate) struct FakeDirectory {
    presence: Mutex<HashMap<UserId, (bool, DateTime<Utc>)>>,
}

impl FakeDirectory {
    pub(crate) fn seed(&self, user_id: UserId, online: bool, last_seen: DateTime<Utc>) {
        self.presence
            .lock()
            .unwrap()
            .insert(user_id, (online, last_seen));
    }

    pub(crate) fn get(&self, user_id: UserId) -> Option<(bool, DateTime<Utc>)> {
        self.presence.lock().unwrap().get(&user_id).copied()
    }
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn last_known_presence(
        &self,
        user_id: UserId,
    ) -> AppResult<Option<(bool, DateTime<Utc>)>> {
        Ok(self.get(user_id))
    }

    async fn record_presence(
        &self,
        user_id: UserId,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> AppResult<()> {
        self.seed(user_id, online, last_seen);
        Ok(())
    }
}

/// Contact graph fake with explicit peer sets.
#[derive(Debug, Default)]
pub(crate) struct FakeContactGraph {
    peers: Mutex<HashMap<UserId, HashSet<UserId>>>,
}

impl FakeContactGraph {
    pub(crate) fn set_peers(&self, user_id: UserId, peers: impl IntoIterator<Item = UserId>) {
        self.peers
            .lock()
            .unwrap()
            .insert(user_id, peers.into_iter().collect());
    }
}

#[async_trait]
impl ContactGraph for FakeContactGraph {
    async fn peers_of(&self, user_id: UserId) -> AppResult<HashSet<UserId>> {
        Ok(self
            .peers
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory chat store.
#[derive(Debug, Default)]
pub(crate) struct InMemoryChatStore {
    chats: Mutex<HashMap<ChatId, Chat>>,
}

impl InMemoryChatStore {
    /// Insert a chat between two users and return its id.
    pub(crate) fn seed_chat(&self, a: UserId, b: UserId) -> ChatId {
        let (low, high) = Chat::normalized_pair(a, b);
        let chat = Chat {
            id: ChatId::new(),
            participant_low: low,
            participant_high: high,
            last_message_id: None,
            last_activity: Utc::now(),
            created_at: Utc::now(),
        };
        let id = chat.id;
        self.chats.lock().unwrap().insert(id, chat);
        id
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn find_by_id(&self, id: ChatId) -> AppResult<Option<Chat>> {
        Ok(self.chats.lock().unwrap().get(&id).cloned())
    }

    async fn touch_last_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(chat) = self.chats.lock().unwrap().get_mut(&chat_id) {
            chat.last_message_id = Some(message_id);
            chat.last_activity = at;
        }
        Ok(())
    }
}

/// In-memory message store with the repositories' transition guards.
#[derive(Debug, Default)]
pub(crate) struct InMemoryMessageStore {
    messages: Mutex<HashMap<MessageId, Message>>,
}

impl InMemoryMessageStore {
    pub(crate) fn get(&self, id: MessageId) -> Option<Message> {
        self.messages.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, new: NewMessage) -> AppResult<Message> {
        let message = Message {
            id: MessageId::new(),
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            content: new.content,
            kind: new.kind,
            status: MessageStatus::Sent,
            delivered_at: None,
            read_at: None,
            created_at: Utc::now(),
        };
        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn mark_delivered(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let mut messages = self.messages.lock().unwrap();
        let Some(message) = messages.get_mut(&id) else {
            return Ok(None);
        };
        if message.sender_id == actor || message.status != MessageStatus::Sent {
            return Ok(None);
        }
        message.status = MessageStatus::Delivered;
        message.delivered_at = Some(at);
        Ok(Some(message.clone()))
    }

    async fn mark_read(
        &self,
        id: MessageId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let mut messages = self.messages.lock().unwrap();
        let Some(message) = messages.get_mut(&id) else {
            return Ok(None);
        };
        if message.sender_id == actor || message.status == MessageStatus::Read {
            return Ok(None);
        }
        message.status = MessageStatus::Read;
        message.read_at = Some(at);
        if message.delivered_at.is_none() {
            message.delivered_at = Some(at);
        }
        Ok(Some(message.clone()))
    }

    async fn mark_chat_delivered(
        &self,
        chat_id: ChatId,
        recipient: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Message>> {
        let mut messages = self.messages.lock().unwrap();
        let mut promoted = Vec::new();
        for message in messages.values_mut() {
            if message.chat_id == chat_id
                && message.sender_id != recipient
                && message.status == MessageStatus::Sent
            {
                message.status = MessageStatus::Delivered;
                message.delivered_at = Some(at);
                promoted.push(message.clone());
            }
        }
        Ok(promoted)
    }
}
