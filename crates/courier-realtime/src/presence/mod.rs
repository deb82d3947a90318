//! Presence tracking backed by the cache with durable fallback.

pub mod store;

pub use store::{Disconnection, PresenceStore};
