//! # courier-realtime
//!
//! Real-time delivery engine for Courier. Provides:
//!
//! - WebSocket connection registry with per-user multi-device fanout
//! - Personal and chat rooms with cross-process pub/sub bridging
//! - TTL-bound presence cache with heartbeat refresh and durable fallback
//! - Contact-scoped presence broadcast honoring block relations
//! - The message status state machine (sent → delivered → read) with
//!   catch-up delivery on chat join

pub mod bridge;
pub mod connection;
pub mod delivery;
pub mod event;
pub mod presence;
pub mod room;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::manager::ConnectionManager;
pub use presence::store::PresenceStore;
pub use room::registry::RoomRegistry;
pub use server::RealtimeEngine;
