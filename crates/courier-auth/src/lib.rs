//! # courier-auth
//!
//! Bearer credential validation for Courier. Tokens are issued by the
//! account service with a shared HMAC secret; this crate only decodes
//! and validates them at connection handshake time.

pub mod jwt;

pub use jwt::{Claims, JwtDecoder};
