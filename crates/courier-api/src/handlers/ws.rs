//! WebSocket upgrade handler.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use courier_realtime::connection::authenticator::{AuthenticatedConnection, WsAuthenticator};
use courier_realtime::connection::keepalive::run_keepalive;

use crate::error::ApiError;
use crate::state::AppState;

/// Optional query parameters for WebSocket authentication.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    /// JWT access token (alternative to the Authorization header).
    pub token: Option<String>,
}

/// GET /ws — WebSocket upgrade.
///
/// The bearer credential comes from the `Authorization` header or the
/// `token` query parameter; a missing or invalid token rejects the
/// connection before any event handler is attached.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .or(query.token)
        .ok_or_else(|| courier_core::AppError::authentication("Missing access token"))?;

    let authenticator = WsAuthenticator::new(state.jwt_decoder.clone());
    let auth = authenticator.authenticate(&token)?;

    Ok(ws.on_upgrade(move |socket| handle_connection(state, auth, socket)))
}

/// Extract a bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

/// Drives an established WebSocket connection.
async fn handle_connection(state: AppState, auth: AuthenticatedConnection, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (handle, mut outbound_rx) = state
        .realtime
        .connections
        .register(auth.user_id, auth.username.clone())
        .await;
    let conn_id = handle.id;

    info!(
        conn_id = %conn_id,
        user_id = %auth.user_id,
        "WebSocket connection established"
    );

    // Outbound forwarder: engine events → socket frames.
    let outbound_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let keepalive_task = tokio::spawn(run_keepalive(
        handle.clone(),
        state.realtime.config().clone(),
    ));

    // Inbound loop: events are processed in arrival order for this
    // connection.
    while let Some(result) = ws_rx.next().await {
        if !handle.is_alive() {
            break;
        }
        match result {
            Ok(Message::Text(text)) => {
                state
                    .realtime
                    .connections
                    .handle_inbound(&conn_id, text.as_str())
                    .await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Offline cleanup runs to completion regardless of how the
    // connection ended; a racing reconnect has a fresh connection id.
    keepalive_task.abort();
    outbound_task.abort();
    state.realtime.connections.unregister(&conn_id).await;

    info!(
        conn_id = %conn_id,
        user_id = %auth.user_id,
        "WebSocket connection closed"
    );
}
