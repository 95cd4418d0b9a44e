//! Authentication and authorization.
//!
//! - `jwks`: verifies provider-issued bearer tokens
//! - `identity`: resolves callers to local users and registers new ones
//! - `gate`: per-action role and ownership checks
//! - `psk`: pre-shared key for administrative routes

pub mod gate;
pub mod identity;
pub mod jwks;
pub mod psk;

pub use identity::{identity_layer, Caller, CurrentUser, IdentityResolver};
pub use jwks::JwksVerifier;
pub use psk::psk_auth_layer;
