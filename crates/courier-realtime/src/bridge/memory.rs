//! In-memory bridge for single-node deployments.

use async_trait::async_trait;
use tokio::sync::broadcast;

use courier_core::result::AppResult;

use super::{PubSubBridge, RoomEvent};

/// In-memory bridge backed by a tokio broadcast channel.
#[derive(Debug)]
pub struct MemoryBridge {
    /// Shared broadcast channel carrying all room events.
    tx: broadcast::Sender<RoomEvent>,
}

impl MemoryBridge {
    /// Create a new in-memory bridge.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }
}

#[async_trait]
impl PubSubBridge for MemoryBridge {
    async fn publish(&self, event: RoomEvent) -> AppResult<()> {
        // No receivers simply means no live relay yet; the event is
        // perishable either way.
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }
}
