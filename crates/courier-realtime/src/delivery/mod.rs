//! Message delivery: the status state machine and catch-up promotion.

pub mod service;

pub use service::{DeliveryNotice, DeliveryService, SendOutcome};
