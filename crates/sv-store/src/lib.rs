//! sv-store: the server side of the vault.
//!
//! Stores ciphertext envelopes scoped by owner and nothing else. It cannot
//! decrypt, and it never sees a title, username, password, url or note.

pub mod health;
mod persist;
mod replay;
pub mod store;

pub use health::{check_health, HealthReport};
pub use store::{EnvelopeStore, ScopedStore};
