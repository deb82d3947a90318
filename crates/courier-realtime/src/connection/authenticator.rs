//! Connection authentication — validates the bearer token presented at
//! handshake time, before any event handler is attached.

use std::sync::Arc;

use courier_auth::jwt::JwtDecoder;
use courier_core::error::AppError;
use courier_core::types::UserId;

/// Authenticated connection info extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedConnection {
    /// User ID.
    pub user_id: UserId,
    /// Username.
    pub username: String,
}

/// Authenticates connections using JWT access tokens.
#[derive(Clone)]
pub struct WsAuthenticator {
    /// JWT decoder.
    decoder: Arc<JwtDecoder>,
}

impl std::fmt::Debug for WsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsAuthenticator").finish()
    }
}

impl WsAuthenticator {
    /// Creates a new authenticator.
    pub fn new(decoder: Arc<JwtDecoder>) -> Self {
        Self { decoder }
    }

    /// Authenticates a connection using a token from the handshake.
    ///
    /// Failure terminates the connection; there are no retries — the
    /// client must reconnect with a fresh credential.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedConnection, AppError> {
        let claims = self.decoder.decode(token)?;

        Ok(AuthenticatedConnection {
            user_id: claims.user_id(),
            username: claims.username,
        })
    }
}
