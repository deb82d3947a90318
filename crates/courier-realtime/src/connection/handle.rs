//! Individual connection handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use courier_core::types::UserId;

use crate::event::OutboundEvent;

/// Unique connection identifier.
///
/// Generated per transport connection; a reconnect gets a fresh id, so
/// cleanup of the old connection and setup of the new one commute.
pub type ConnectionId = Uuid;

/// A handle to a single live connection.
///
/// Holds the sender half of the outbound queue plus metadata about the
/// connected user. Owned by the process holding the transport; never
/// shared across processes.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// User who owns this connection.
    pub user_id: UserId,
    /// Username (cached for logging).
    pub username: String,
    /// Sender for outbound events.
    sender: mpsc::Sender<OutboundEvent>,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    /// Last client activity (any inbound event).
    pub last_activity: tokio::sync::RwLock<DateTime<Utc>>,
    /// Whether the connection is still alive.
    alive: AtomicBool,
}

impl ConnectionHandle {
    /// Create a new connection handle.
    pub fn new(user_id: UserId, username: String, sender: mpsc::Sender<OutboundEvent>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            username,
            sender,
            connected_at: now,
            last_activity: tokio::sync::RwLock::new(now),
            alive: AtomicBool::new(true),
        }
    }

    /// Queue an outbound event for this connection.
    ///
    /// Returns `false` when the event was dropped: the connection is
    /// dead, its buffer is full, or the receiver side is gone.
    pub async fn send(&self, event: OutboundEvent) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, "Send buffer full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Check if the connection is alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the connection as dead.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Update the last-activity timestamp.
    pub async fn touch(&self) {
        let mut la = self.last_activity.write().await;
        *la = Utc::now();
    }
}
