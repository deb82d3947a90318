//! # courier-api
//!
//! Thin HTTP surface for Courier: the WebSocket upgrade endpoint that
//! feeds the realtime engine, plus health checks. Profile, contact, and
//! chat CRUD routing live in the account service, not here.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
