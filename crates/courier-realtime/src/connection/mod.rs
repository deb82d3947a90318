//! Connection lifecycle: handles, pool, authentication, dispatch, keepalive.

pub mod authenticator;
pub mod handle;
pub mod keepalive;
pub mod manager;
pub mod pool;

pub use authenticator::{AuthenticatedConnection, WsAuthenticator};
pub use handle::{ConnectionHandle, ConnectionId};
pub use manager::ConnectionManager;
pub use pool::ConnectionPool;
