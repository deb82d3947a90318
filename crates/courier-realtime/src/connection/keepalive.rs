//! Transport keepalive for a connection.

use std::sync::Arc;

use chrono::Utc;
use tokio::time;
use tracing::{debug, warn};

use courier_core::config::realtime::RealtimeConfig;

use crate::event::OutboundEvent;

use super::handle::ConnectionHandle;

/// Run the keepalive loop for a connection.
///
/// Sends periodic pings and marks the connection dead when no client
/// activity (pong, heartbeat, or any other event) arrives within the
/// timeout. The transport loop notices the dead flag and tears down.
pub async fn run_keepalive(handle: Arc<ConnectionHandle>, config: RealtimeConfig) {
    let mut interval = time::interval(time::Duration::from_secs(config.ping_interval_seconds));
    // The first tick fires immediately; skip it so a fresh connection
    // is not pinged before it finished setup.
    interval.tick().await;

    loop {
        interval.tick().await;

        if !handle.is_alive() {
            break;
        }

        let last_activity = *handle.last_activity.read().await;
        let idle = Utc::now() - last_activity;

        if let Ok(idle_std) = idle.to_std() {
            if idle_std.as_secs() > config.ping_timeout_seconds {
                warn!(
                    conn_id = %handle.id,
                    idle_seconds = idle_std.as_secs(),
                    "Connection timed out, marking dead"
                );
                handle.mark_dead();
                break;
            }
        }

        let ping = OutboundEvent::Ping {
            timestamp: Utc::now().timestamp_millis(),
        };
        if !handle.send(ping).await {
            debug!(conn_id = %handle.id, "Ping send failed, marking dead");
            handle.mark_dead();
            break;
        }
    }

    debug!(conn_id = %handle.id, "Keepalive loop ended");
}
