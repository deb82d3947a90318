//! Top-level realtime engine that ties together all subsystems.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use courier_cache::CacheManager;
use courier_core::config::realtime::RealtimeConfig;
use courier_core::error::AppError;
use courier_core::result::AppResult;

use crate::bridge::{MemoryBridge, PubSubBridge, RoomEvent};
use crate::connection::manager::ConnectionManager;
use crate::delivery::DeliveryService;
use crate::presence::store::PresenceStore;
use crate::store::{ChatStore, ContactGraph, MessageStore, UserDirectory};

/// Central realtime engine coordinating all subsystems.
///
/// Explicitly constructed by the process's startup routine and passed
/// by reference; there is no ambient global handle.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Connection manager / dispatcher.
    pub connections: Arc<ConnectionManager>,
    /// Presence store.
    pub presence: Arc<PresenceStore>,
    /// Configuration.
    config: RealtimeConfig,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Creates a new realtime engine and starts the bridge relay task.
    pub fn new(
        config: RealtimeConfig,
        bridge: Arc<dyn PubSubBridge>,
        cache: Arc<CacheManager>,
        directory: Arc<dyn UserDirectory>,
        contacts: Arc<dyn ContactGraph>,
        chats: Arc<dyn ChatStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let presence = Arc::new(PresenceStore::new(
            cache,
            directory,
            Duration::from_secs(config.presence_ttl_seconds),
        ));
        let delivery = DeliveryService::new(chats.clone(), messages);
        let connections = Arc::new(ConnectionManager::new(
            config.clone(),
            bridge.clone(),
            presence.clone(),
            contacts,
            chats,
            delivery,
        ));

        tokio::spawn(run_bridge_relay(
            bridge.subscribe(),
            connections.clone(),
            shutdown_tx.subscribe(),
        ));

        info!("Realtime engine initialized");

        Self {
            connections,
            presence,
            config,
            shutdown_tx,
        }
    }

    /// Builds the configured pub/sub bridge.
    ///
    /// Fails fast when the multi-node bridge cannot be reached: the
    /// process must not accept connections it cannot fan out for.
    pub async fn build_bridge(config: &RealtimeConfig) -> AppResult<Arc<dyn PubSubBridge>> {
        match config.bridge.as_str() {
            "memory" => {
                info!("Initializing in-memory bridge (single node)");
                Ok(Arc::new(MemoryBridge::new(config.bridge_buffer_size)))
            }
            #[cfg(feature = "redis-bridge")]
            "redis" => {
                info!("Initializing Redis bridge (multi node)");
                let bridge =
                    crate::bridge::RedisBridge::connect(&config.bridge_url, config.bridge_buffer_size)
                        .await?;
                Ok(Arc::new(bridge))
            }
            other => Err(AppError::configuration(format!(
                "Unknown bridge: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Returns the realtime configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Returns a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates a graceful shutdown of the realtime engine.
    pub async fn shutdown(&self) {
        info!("Shutting down realtime engine");
        let _ = self.shutdown_tx.send(());
        self.connections.close_all();
        info!("Realtime engine shut down");
    }
}

/// Forward bridge events to the local members of each room.
///
/// This is the single delivery path: events published on this instance
/// and events published elsewhere both arrive here.
async fn run_bridge_relay(
    mut bridge_rx: broadcast::Receiver<RoomEvent>,
    connections: Arc<ConnectionManager>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = bridge_rx.recv() => match result {
                Ok(event) => connections.deliver_local(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // At-least-once only holds for events we saw; lagging
                    // drops perishable broadcasts, which is acceptable.
                    warn!(skipped, "Bridge relay lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    info!("Bridge relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use courier_core::types::UserId;
    use courier_entity::message::MessageKind;

    use crate::event::{InboundEvent, OutboundEvent};
    use crate::testing::{
        memory_cache, FakeContactGraph, FakeDirectory, InMemoryChatStore, InMemoryMessageStore,
    };

    fn engine_with(chats: Arc<InMemoryChatStore>) -> RealtimeEngine {
        let config = RealtimeConfig::default();
        let bridge: Arc<dyn PubSubBridge> = Arc::new(MemoryBridge::new(64));
        RealtimeEngine::new(
            config,
            bridge,
            memory_cache(),
            Arc::new(FakeDirectory::default()),
            Arc::new(FakeContactGraph::default()),
            chats,
            Arc::new(InMemoryMessageStore::default()),
        )
    }

    #[tokio::test]
    async fn test_message_flows_through_relay_to_recipient() {
        let chats = Arc::new(InMemoryChatStore::default());
        let alice = UserId::new();
        let bob = UserId::new();
        let chat_id = chats.seed_chat(alice, bob);

        let engine = engine_with(chats);

        let (alice_handle, mut alice_rx) = engine
            .connections
            .register(alice, "alice".to_string())
            .await;
        let (_bob_handle, mut bob_rx) = engine.connections.register(bob, "bob".to_string()).await;

        let frame = serde_json::to_string(&InboundEvent::SendMessage {
            chat_id,
            content: "hi".to_string(),
            kind: MessageKind::Text,
        })
        .unwrap();
        engine.connections.handle_inbound(&alice_handle.id, &frame).await;

        // Ack is direct; the broadcast crosses the bridge relay task.
        assert!(matches!(
            alice_rx.try_recv().unwrap(),
            OutboundEvent::SendAck { success: true, .. }
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            bob_rx.try_recv().expect("relayed to personal room"),
            OutboundEvent::MessageNew { .. }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let engine = engine_with(Arc::new(InMemoryChatStore::default()));
        let (handle, _rx) = engine
            .connections
            .register(UserId::new(), "alice".to_string())
            .await;

        engine.shutdown().await;

        assert!(!handle.is_alive());
        assert_eq!(engine.connections.connection_count(), 0);
    }
}
