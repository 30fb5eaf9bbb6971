//! sv-core: types, config and the store contract shared by every SealVault crate

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use store::{IdempotencyKey, VaultStore, IDEMPOTENCY_HEADER};
pub use types::{
    CipherEnvelope, MessageBody, RecordEvent, RecordId, RecordState, VaultEnvelopeRecord,
    VaultRecord, WireRecord,
};
