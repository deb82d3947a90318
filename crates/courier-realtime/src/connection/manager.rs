//! Connection manager — the dispatcher wiring each authenticated
//! connection to rooms, presence, and the delivery state machine.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use courier_core::config::realtime::RealtimeConfig;
use courier_core::error::ErrorKind;
use courier_core::types::{ChatId, MessageId, UserId};
use courier_entity::message::MessageKind;

use crate::bridge::{PubSubBridge, RoomEvent};
use crate::delivery::DeliveryService;
use crate::event::{InboundEvent, OutboundEvent, PresenceInfo};
use crate::presence::{Disconnection, PresenceStore};
use crate::room;
use crate::room::registry::RoomRegistry;
use crate::store::{ChatStore, ContactGraph};

use super::handle::{ConnectionHandle, ConnectionId};
use super::pool::ConnectionPool;

/// Manages all active connections on this process.
///
/// One instance per process, explicitly constructed at startup and
/// shared by reference; the registry it owns is never visible to other
/// processes — cross-process state goes through the presence store and
/// the bridge only.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Configuration.
    config: RealtimeConfig,
    /// Connection pool.
    pool: Arc<ConnectionPool>,
    /// Room registry.
    rooms: Arc<RoomRegistry>,
    /// Cross-process broadcast bridge.
    bridge: Arc<dyn PubSubBridge>,
    /// Presence store.
    presence: Arc<PresenceStore>,
    /// Contact graph for presence scoping.
    contacts: Arc<dyn ContactGraph>,
    /// Chat lookups for participant checks.
    chats: Arc<dyn ChatStore>,
    /// Message state machine.
    delivery: DeliveryService,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: RealtimeConfig,
        bridge: Arc<dyn PubSubBridge>,
        presence: Arc<PresenceStore>,
        contacts: Arc<dyn ContactGraph>,
        chats: Arc<dyn ChatStore>,
        delivery: DeliveryService,
    ) -> Self {
        Self {
            config,
            pool: Arc::new(ConnectionPool::new()),
            rooms: Arc::new(RoomRegistry::new()),
            bridge,
            presence,
            contacts,
            chats,
            delivery,
        }
    }

    /// Registers a new authenticated connection.
    ///
    /// Joins the personal room, marks the user online, and broadcasts
    /// the online transition to contact peers when this was the user's
    /// first live connection. Returns the handle and the receiver for
    /// outbound events.
    pub async fn register(
        &self,
        user_id: UserId,
        username: String,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(self.config.send_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(user_id, username, tx));

        self.pool.add(handle.clone());
        self.rooms.join(room::personal(user_id), handle.id);

        match self.presence.set_online(user_id, handle.id).await {
            Ok(true) => {
                self.broadcast_presence(user_id, OutboundEvent::UserOnline { user_id })
                    .await;
            }
            Ok(false) => {}
            // Presence is advisory; a cache hiccup must not refuse the
            // connection.
            Err(e) => warn!(user_id = %user_id, error = %e, "Presence online update failed"),
        }

        info!(
            conn_id = %handle.id,
            user_id = %user_id,
            "Connection registered"
        );

        (handle, rx)
    }

    /// Unregisters a connection and runs offline cleanup to completion.
    ///
    /// A fast-following reconnect has a fresh connection id, so cleanup
    /// of this id and setup of the new one commute safely.
    pub async fn unregister(&self, conn_id: &ConnectionId) {
        let Some(handle) = self.pool.remove(conn_id) else {
            return;
        };
        handle.mark_dead();
        self.rooms.leave_all(*conn_id);

        let user_id = handle.user_id;
        match self.presence.remove_connection(user_id, *conn_id).await {
            Ok(Disconnection::FullyOffline { last_seen }) => {
                self.broadcast_presence(user_id, OutboundEvent::UserOffline { user_id, last_seen })
                    .await;
            }
            Ok(Disconnection::StillConnected) => {}
            Err(e) => {
                // Presence state is unknown; err on the side of telling
                // peers the user left. The next reconnect corrects it.
                warn!(user_id = %user_id, error = %e, "Presence offline update failed");
                self.broadcast_presence(
                    user_id,
                    OutboundEvent::UserOffline {
                        user_id,
                        last_seen: chrono::Utc::now(),
                    },
                )
                .await;
            }
        }

        info!(
            conn_id = %conn_id,
            user_id = %user_id,
            "Connection unregistered"
        );
    }

    /// Processes one inbound frame from a client.
    ///
    /// Request/response events (send, presence query) and room
    /// transitions complete before the next frame, preserving
    /// per-connection ordering. Advisory signals (heartbeat, deliver/
    /// read acks) are spawned and not awaited.
    pub async fn handle_inbound(self: &Arc<Self>, conn_id: &ConnectionId, raw: &str) {
        let Some(handle) = self.pool.get(conn_id) else {
            warn!(conn_id = %conn_id, "Event from unknown connection");
            return;
        };

        handle.touch().await;

        let event: InboundEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                handle
                    .send(OutboundEvent::Error {
                        code: "INVALID_EVENT".to_string(),
                        message: format!("Failed to parse event: {e}"),
                    })
                    .await;
                return;
            }
        };

        match event {
            InboundEvent::JoinChat { chat_id } => self.join_chat(&handle, chat_id).await,
            InboundEvent::LeaveChat { chat_id } => {
                self.rooms.leave(&room::chat(chat_id), handle.id);
                debug!(conn_id = %handle.id, chat_id = %chat_id, "Left chat room");
            }
            InboundEvent::TypingStart { chat_id } => self.relay_typing(&handle, chat_id, true).await,
            InboundEvent::TypingStop { chat_id } => self.relay_typing(&handle, chat_id, false).await,
            InboundEvent::SendMessage {
                chat_id,
                content,
                kind,
            } => self.send_message(&handle, chat_id, content, kind).await,
            InboundEvent::MarkDelivered { message_id } => {
                let manager = self.clone();
                let handle = handle.clone();
                tokio::spawn(async move { manager.mark_delivered(&handle, message_id).await });
            }
            InboundEvent::MarkRead { message_id } => {
                let manager = self.clone();
                let handle = handle.clone();
                tokio::spawn(async move { manager.mark_read(&handle, message_id).await });
            }
            InboundEvent::Heartbeat => {
                let manager = self.clone();
                let user_id = handle.user_id;
                tokio::spawn(async move {
                    if let Err(e) = manager.presence.heartbeat(user_id).await {
                        warn!(user_id = %user_id, error = %e, "Heartbeat refresh failed");
                    }
                });
            }
            InboundEvent::PresenceQuery { user_ids } => {
                self.presence_query(&handle, user_ids).await
            }
            InboundEvent::Pong => {}
        }
    }

    /// Join a chat room and run catch-up delivery.
    ///
    /// Joining a chat the user is not a participant of is a silent
    /// no-op: join is an advisory event, not a request.
    async fn join_chat(&self, handle: &Arc<ConnectionHandle>, chat_id: ChatId) {
        let chat = match self.chats.find_by_id(chat_id).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                debug!(conn_id = %handle.id, chat_id = %chat_id, "Join for unknown chat");
                return;
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Chat lookup failed on join");
                return;
            }
        };
        if !chat.is_participant(handle.user_id) {
            debug!(
                conn_id = %handle.id,
                chat_id = %chat_id,
                "Join refused: not a participant"
            );
            return;
        }

        self.rooms.join(room::chat(chat_id), handle.id);
        debug!(conn_id = %handle.id, chat_id = %chat_id, "Joined chat room");

        match self.delivery.catch_up(handle.user_id, chat_id).await {
            Ok(notices) => {
                for notice in notices {
                    self.publish(RoomEvent::new(
                        room::personal(notice.sender_id),
                        OutboundEvent::MessagesDelivered {
                            chat_id: notice.chat_id,
                            message_ids: notice.message_ids,
                            delivered_at: notice.delivered_at,
                        },
                    ))
                    .await;
                }
            }
            Err(e) => warn!(chat_id = %chat_id, error = %e, "Catch-up delivery failed"),
        }
    }

    /// Relay a typing indicator to the chat room, excluding the typist.
    async fn relay_typing(&self, handle: &Arc<ConnectionHandle>, chat_id: ChatId, typing: bool) {
        self.publish(RoomEvent::from_connection(
            room::chat(chat_id),
            handle.id,
            OutboundEvent::Typing {
                chat_id,
                user_id: handle.user_id,
                typing,
            },
        ))
        .await;
    }

    /// Handle a send request: persist, ack the sender, broadcast.
    async fn send_message(
        &self,
        handle: &Arc<ConnectionHandle>,
        chat_id: ChatId,
        content: String,
        kind: MessageKind,
    ) {
        match self
            .delivery
            .send(handle.user_id, chat_id, &content, kind)
            .await
        {
            Ok(outcome) => {
                handle
                    .send(OutboundEvent::SendAck {
                        success: true,
                        message: Some((&outcome.message).into()),
                        error: None,
                    })
                    .await;

                let broadcast = OutboundEvent::message_new(&outcome.message);
                // Chat room for anyone with the chat open (the sender's
                // other devices included), personal room so the
                // recipient hears about it even with the chat closed.
                self.publish(RoomEvent::from_connection(
                    room::chat(chat_id),
                    handle.id,
                    broadcast.clone(),
                ))
                .await;
                self.publish(RoomEvent::from_connection(
                    room::personal(outcome.recipient),
                    handle.id,
                    broadcast,
                ))
                .await;
            }
            Err(e) => {
                let message = match e.kind {
                    ErrorKind::Validation | ErrorKind::NotFound => e.message.clone(),
                    _ => {
                        warn!(chat_id = %chat_id, error = %e, "Send failed");
                        "Failed to send message".to_string()
                    }
                };
                handle
                    .send(OutboundEvent::SendAck {
                        success: false,
                        message: None,
                        error: Some(message),
                    })
                    .await;
            }
        }
    }

    /// Handle a delivered acknowledgment. Advisory: failures are quiet.
    async fn mark_delivered(&self, handle: &Arc<ConnectionHandle>, message_id: MessageId) {
        match self.delivery.mark_delivered(handle.user_id, message_id).await {
            Ok(Some(message)) => {
                if let Some(delivered_at) = message.delivered_at {
                    self.publish(RoomEvent::new(
                        room::personal(message.sender_id),
                        OutboundEvent::MessageDelivered {
                            message_id: message.id,
                            delivered_at,
                        },
                    ))
                    .await;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(message_id = %message_id, error = %e, "Deliver ack failed"),
        }
    }

    /// Handle a read acknowledgment. Advisory: failures are quiet.
    async fn mark_read(&self, handle: &Arc<ConnectionHandle>, message_id: MessageId) {
        match self.delivery.mark_read(handle.user_id, message_id).await {
            Ok(Some(message)) => {
                if let Some(read_at) = message.read_at {
                    self.publish(RoomEvent::new(
                        room::personal(message.sender_id),
                        OutboundEvent::MessageRead {
                            message_id: message.id,
                            read_at,
                        },
                    ))
                    .await;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(message_id = %message_id, error = %e, "Read ack failed"),
        }
    }

    /// Answer a presence query on the same connection.
    async fn presence_query(&self, handle: &Arc<ConnectionHandle>, user_ids: Vec<UserId>) {
        let presence = match self.presence.bulk_get_presence(&user_ids).await {
            Ok(records) => records
                .into_iter()
                .map(|(user_id, record)| {
                    (
                        user_id,
                        PresenceInfo {
                            online: record.online,
                            last_seen: record.last_seen,
                        },
                    )
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Presence query failed");
                Default::default()
            }
        };

        handle.send(OutboundEvent::PresenceSnapshot { presence }).await;
    }

    /// Broadcast a presence transition to the user's contact peers only.
    ///
    /// Fire-and-forget: peers outside the relation graph never learn
    /// this user's state, and unreachable peers simply miss the event.
    async fn broadcast_presence(&self, user_id: UserId, event: OutboundEvent) {
        let peers = match self.contacts.peers_of(user_id).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Peer resolution failed");
                return;
            }
        };

        for peer in peers {
            self.publish(RoomEvent::new(room::personal(peer), event.clone()))
                .await;
        }
    }

    /// Publish a room event through the bridge, dropping it on failure.
    async fn publish(&self, event: RoomEvent) {
        if let Err(e) = self.bridge.publish(event).await {
            warn!(error = %e, "Bridge publish failed, event dropped");
        }
    }

    /// Deliver a bridge event to the local members of its room,
    /// skipping the originating connection.
    pub async fn deliver_local(&self, event: RoomEvent) {
        for conn_id in self.rooms.members(&event.room) {
            if event.origin == Some(conn_id) {
                continue;
            }
            if let Some(handle) = self.pool.get(&conn_id) {
                handle.send(event.event.clone()).await;
            }
        }
    }

    /// Returns the total connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Checks if a user has a connection on this process.
    pub fn is_user_connected(&self, user_id: &UserId) -> bool {
        !self.pool.user_connections(user_id).is_empty()
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Returns a reference to the room registry.
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Marks every connection dead (graceful shutdown).
    pub fn close_all(&self) {
        for handle in self.pool.all_connections() {
            handle.mark_dead();
            self.pool.remove(&handle.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use crate::bridge::MemoryBridge;
    use crate::testing::{
        memory_cache, FakeContactGraph, FakeDirectory, InMemoryChatStore, InMemoryMessageStore,
    };

    struct Harness {
        manager: Arc<ConnectionManager>,
        bridge: Arc<MemoryBridge>,
        contacts: Arc<FakeContactGraph>,
        chats: Arc<InMemoryChatStore>,
    }

    fn harness() -> Harness {
        let bridge = Arc::new(MemoryBridge::new(64));
        let contacts = Arc::new(FakeContactGraph::default());
        let chats = Arc::new(InMemoryChatStore::default());
        let messages = Arc::new(InMemoryMessageStore::default());
        let presence = Arc::new(PresenceStore::new(
            memory_cache(),
            Arc::new(FakeDirectory::default()),
            Duration::from_secs(300),
        ));
        let delivery = DeliveryService::new(chats.clone(), messages);
        let manager = Arc::new(ConnectionManager::new(
            RealtimeConfig::default(),
            bridge.clone(),
            presence,
            contacts.clone(),
            chats.clone(),
            delivery,
        ));
        Harness {
            manager,
            bridge,
            contacts,
            chats,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn inbound(event: &InboundEvent) -> String {
        serde_json::to_string(event).expect("serialize inbound")
    }

    #[tokio::test]
    async fn test_online_broadcast_reaches_peers_only() {
        let h = harness();
        let alice = UserId::new();
        let bob = UserId::new();
        h.contacts.set_peers(alice, [bob]);

        let mut bridge_rx = h.bridge.subscribe();
        let (_handle, _rx) = h.manager.register(alice, "alice".to_string()).await;

        let events = drain(&mut bridge_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].room, room::personal(bob));
        assert!(matches!(
            events[0].event,
            OutboundEvent::UserOnline { user_id } if user_id == alice
        ));
    }

    #[tokio::test]
    async fn test_second_device_does_not_rebroadcast_online() {
        let h = harness();
        let alice = UserId::new();
        h.contacts.set_peers(alice, [UserId::new()]);

        let (_first, _rx1) = h.manager.register(alice, "alice".to_string()).await;

        let mut bridge_rx = h.bridge.subscribe();
        let (_second, _rx2) = h.manager.register(alice, "alice".to_string()).await;

        assert!(drain(&mut bridge_rx).is_empty());
    }

    #[tokio::test]
    async fn test_offline_fires_once_after_last_connection() {
        let h = harness();
        let alice = UserId::new();
        let bob = UserId::new();
        h.contacts.set_peers(alice, [bob]);

        let (first, _rx1) = h.manager.register(alice, "alice".to_string()).await;
        let (second, _rx2) = h.manager.register(alice, "alice".to_string()).await;

        let mut bridge_rx = h.bridge.subscribe();

        h.manager.unregister(&first.id).await;
        assert!(drain(&mut bridge_rx).is_empty());

        h.manager.unregister(&second.id).await;
        let events = drain(&mut bridge_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].room, room::personal(bob));
        assert!(matches!(
            events[0].event,
            OutboundEvent::UserOffline { user_id, .. } if user_id == alice
        ));
    }

    #[tokio::test]
    async fn test_send_message_acks_and_broadcasts() {
        let h = harness();
        let alice = UserId::new();
        let bob = UserId::new();
        let chat_id = h.chats.seed_chat(alice, bob);

        let (handle, mut rx) = h.manager.register(alice, "alice".to_string()).await;
        let mut bridge_rx = h.bridge.subscribe();

        h.manager
            .handle_inbound(
                &handle.id,
                &inbound(&InboundEvent::SendMessage {
                    chat_id,
                    content: "hi".to_string(),
                    kind: MessageKind::Text,
                }),
            )
            .await;

        match rx.try_recv().expect("ack queued") {
            OutboundEvent::SendAck {
                success, message, ..
            } => {
                assert!(success);
                let message = message.expect("message in ack");
                assert_eq!(message.chat_id, chat_id);
                assert_eq!(message.sender_id, alice);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let events = drain(&mut bridge_rx);
        let rooms: Vec<&str> = events.iter().map(|e| e.room.as_str()).collect();
        assert_eq!(events.len(), 2);
        assert!(rooms.contains(&room::chat(chat_id).as_str()));
        assert!(rooms.contains(&room::personal(bob).as_str()));
        for event in &events {
            assert_eq!(event.origin, Some(handle.id));
            assert!(matches!(event.event, OutboundEvent::MessageNew { .. }));
        }
    }

    #[tokio::test]
    async fn test_send_to_foreign_chat_is_rejected() {
        let h = harness();
        let chat_id = h.chats.seed_chat(UserId::new(), UserId::new());

        let mallory = UserId::new();
        let (handle, mut rx) = h.manager.register(mallory, "mallory".to_string()).await;

        h.manager
            .handle_inbound(
                &handle.id,
                &inbound(&InboundEvent::SendMessage {
                    chat_id,
                    content: "hi".to_string(),
                    kind: MessageKind::Text,
                }),
            )
            .await;

        match rx.try_recv().expect("ack queued") {
            OutboundEvent::SendAck { success, error, .. } => {
                assert!(!success);
                assert!(error.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_chat_emits_grouped_catchup() {
        let h = harness();
        let alice = UserId::new();
        let bob = UserId::new();
        let chat_id = h.chats.seed_chat(alice, bob);

        let (alice_handle, _alice_rx) = h.manager.register(alice, "alice".to_string()).await;
        for content in ["one", "two", "three"] {
            h.manager
                .handle_inbound(
                    &alice_handle.id,
                    &inbound(&InboundEvent::SendMessage {
                        chat_id,
                        content: content.to_string(),
                        kind: MessageKind::Text,
                    }),
                )
                .await;
        }

        let (bob_handle, _bob_rx) = h.manager.register(bob, "bob".to_string()).await;
        let mut bridge_rx = h.bridge.subscribe();

        h.manager
            .handle_inbound(&bob_handle.id, &inbound(&InboundEvent::JoinChat { chat_id }))
            .await;

        assert!(h.manager.rooms().is_member(&room::chat(chat_id), bob_handle.id));

        let events = drain(&mut bridge_rx);
        assert_eq!(events.len(), 1, "one notice per sender, not per message");
        assert_eq!(events[0].room, room::personal(alice));
        match &events[0].event {
            OutboundEvent::MessagesDelivered { message_ids, .. } => {
                assert_eq!(message_ids.len(), 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_foreign_chat_is_silent_noop() {
        let h = harness();
        let chat_id = h.chats.seed_chat(UserId::new(), UserId::new());

        let mallory = UserId::new();
        let (handle, mut rx) = h.manager.register(mallory, "mallory".to_string()).await;
        let mut bridge_rx = h.bridge.subscribe();

        h.manager
            .handle_inbound(&handle.id, &inbound(&InboundEvent::JoinChat { chat_id }))
            .await;

        assert!(!h.manager.rooms().is_member(&room::chat(chat_id), handle.id));
        assert!(drain(&mut bridge_rx).is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_local_skips_origin() {
        let h = harness();
        let alice = UserId::new();
        let bob = UserId::new();
        let chat_id = h.chats.seed_chat(alice, bob);

        let (alice_handle, mut alice_rx) = h.manager.register(alice, "alice".to_string()).await;
        let (bob_handle, mut bob_rx) = h.manager.register(bob, "bob".to_string()).await;

        let chat_room = room::chat(chat_id);
        h.manager.rooms().join(chat_room.clone(), alice_handle.id);
        h.manager.rooms().join(chat_room.clone(), bob_handle.id);

        h.manager
            .deliver_local(RoomEvent::from_connection(
                chat_room,
                alice_handle.id,
                OutboundEvent::Typing {
                    chat_id,
                    user_id: alice,
                    typing: true,
                },
            ))
            .await;

        assert!(matches!(
            bob_rx.try_recv().expect("relayed to peer"),
            OutboundEvent::Typing { typing: true, .. }
        ));
        assert!(alice_rx.try_recv().is_err(), "typist gets no echo");
    }

    #[tokio::test]
    async fn test_presence_query_omits_unknown_users() {
        let h = harness();
        let alice = UserId::new();
        let unknown = UserId::new();

        let (handle, mut rx) = h.manager.register(alice, "alice".to_string()).await;

        h.manager
            .handle_inbound(
                &handle.id,
                &inbound(&InboundEvent::PresenceQuery {
                    user_ids: vec![alice, unknown],
                }),
            )
            .await;

        match rx.try_recv().expect("snapshot queued") {
            OutboundEvent::PresenceSnapshot { presence } => {
                assert!(presence.contains_key(&alice));
                assert!(!presence.contains_key(&unknown));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_structured_error() {
        let h = harness();
        let (handle, mut rx) = h.manager.register(UserId::new(), "alice".to_string()).await;

        h.manager.handle_inbound(&handle.id, "not json").await;

        match rx.try_recv().expect("error queued") {
            OutboundEvent::Error { code, .. } => assert_eq!(code, "INVALID_EVENT"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
