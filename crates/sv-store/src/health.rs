//! Store health check

use serde::Serialize;

use crate::EnvelopeStore;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub records: usize,
    pub persistent: bool,
}

/// Snapshot of store liveness for `/healthz`. Never fails: if the lock can be
/// taken the store is serving.
pub async fn check_health(store: &EnvelopeStore) -> HealthReport {
    HealthReport {
        status: "ok",
        records: store.len().await,
        persistent: store.data_file().is_some(),
    }
}
