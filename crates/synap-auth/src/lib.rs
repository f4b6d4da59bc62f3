//! # synap-auth
//!
//! Token verification for realtime clients.
//!
//! The realtime layer never issues tokens; it only asks a [`TokenVerifier`]
//! which user a presented token belongs to. [`JwtVerifier`] checks HS256
//! tokens signed with the shared secret the HTTP API uses at login.

#![deny(unsafe_code)]

pub mod claims;
pub mod errors;
pub mod test_utils;
pub mod verifier;

pub use claims::TokenClaims;
pub use errors::{AuthError, Result};
pub use verifier::{JwtVerifier, TokenVerifier};
