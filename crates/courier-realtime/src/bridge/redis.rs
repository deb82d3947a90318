//! Redis bridge for multi-node deployments.
//!
//! All instances publish to one well-known channel; each instance runs a
//! listener task that forwards received events into its local broadcast
//! channel, where the engine's relay picks them up.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;
use tracing::{info, warn};

use courier_core::error::{AppError, ErrorKind};
use courier_core::result::AppResult;

use super::{PubSubBridge, RoomEvent};

/// Redis channel carrying all room events between instances.
const BRIDGE_CHANNEL: &str = "courier:rooms";

/// Redis-backed bridge for cross-node fanout.
#[derive(Debug)]
pub struct RedisBridge {
    /// Publishing connection (multiplexed, reconnecting).
    conn: ConnectionManager,
    /// Local fan-in of events received from Redis.
    tx: broadcast::Sender<RoomEvent>,
}

impl RedisBridge {
    /// Connect to Redis and start the listener task.
    ///
    /// Fails when Redis is unreachable; the process must not start
    /// accepting connections without its bridge.
    pub async fn connect(url: &str, buffer_size: usize) -> AppResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to create Redis bridge client", e)
        })?;

        let conn = ConnectionManager::new(client.clone()).await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to connect Redis bridge", e)
        })?;

        let mut pubsub = client.get_async_pubsub().await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to open Redis subscription", e)
        })?;
        pubsub.subscribe(BRIDGE_CHANNEL).await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to subscribe to bridge channel", e)
        })?;

        let (tx, _) = broadcast::channel(buffer_size);
        let relay_tx = tx.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "Unreadable bridge payload");
                        continue;
                    }
                };
                match serde_json::from_str::<RoomEvent>(&payload) {
                    Ok(event) => {
                        let _ = relay_tx.send(event);
                    }
                    Err(e) => warn!(error = %e, "Malformed bridge event"),
                }
            }
            info!("Redis bridge listener stopped");
        });

        info!(channel = BRIDGE_CHANNEL, "Redis bridge connected");
        Ok(Self { conn, tx })
    }
}

#[async_trait]
impl PubSubBridge for RedisBridge {
    async fn publish(&self, event: RoomEvent) -> AppResult<()> {
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.conn.clone();

        redis::cmd("PUBLISH")
            .arg(BRIDGE_CHANNEL)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Cache, "Redis bridge PUBLISH failed", e)
            })?;

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }
}
