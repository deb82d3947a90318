//! Cross-process broadcast bridge.
//!
//! Every room-addressed event — local or remote — is published through
//! the bridge and delivered by the subscription side, so single-node and
//! multi-node deployments share one fanout path. Delivery semantics are
//! at-least-once with no ordering guarantee.

pub mod memory;
#[cfg(feature = "redis-bridge")]
pub mod redis;

pub use memory::MemoryBridge;
#[cfg(feature = "redis-bridge")]
pub use redis::RedisBridge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use courier_core::result::AppResult;

use crate::connection::handle::ConnectionId;
use crate::event::OutboundEvent;

/// An event addressed to one room, as carried across the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    /// Target room name.
    pub room: String,
    /// Connection that caused the event; local delivery skips it so the
    /// originating socket never receives its own broadcast.
    pub origin: Option<ConnectionId>,
    /// The event to deliver.
    pub event: OutboundEvent,
}

impl RoomEvent {
    /// An event with no originating connection (server-initiated).
    pub fn new(room: impl Into<String>, event: OutboundEvent) -> Self {
        Self {
            room: room.into(),
            origin: None,
            event,
        }
    }

    /// An event caused by a specific connection, which is excluded from
    /// local delivery.
    pub fn from_connection(
        room: impl Into<String>,
        origin: ConnectionId,
        event: OutboundEvent,
    ) -> Self {
        Self {
            room: room.into(),
            origin: Some(origin),
            event,
        }
    }
}

/// Pub/sub bridge between process instances.
#[async_trait]
pub trait PubSubBridge: Send + Sync + std::fmt::Debug + 'static {
    /// Publish an event to a room on every instance, this one included.
    async fn publish(&self, event: RoomEvent) -> AppResult<()>;

    /// Subscribe to the stream of room events reaching this instance.
    fn subscribe(&self) -> broadcast::Receiver<RoomEvent>;
}
