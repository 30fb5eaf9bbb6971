//! svd: the SealVault server.
//!
//! Serves the vault API over HTTP on top of [`sv_store::EnvelopeStore`].
//! Callers are identified by bearer token through a [`auth::TokenGate`]; the
//! server stores their ciphertext envelopes and can never decrypt them.

pub mod api;
pub mod auth;
pub mod daemon;
pub mod error;
pub mod logging;

pub use api::{router, AppState};
pub use auth::{Owner, StaticTokenGate, TokenGate};
pub use error::ApiError;
