//! Wire event definitions for the realtime channel.

pub mod types;

pub use types::{InboundEvent, MessagePayload, OutboundEvent, PresenceInfo};
