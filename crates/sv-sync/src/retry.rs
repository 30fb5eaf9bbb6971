//! Retry for transient transport failures.
//!
//! Only `VaultError::Network` is retried. Mutations are retried with the same
//! idempotency key (the caller captures it in the closure), so a request that
//! reached the server before the connection dropped is replayed, not re-applied.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use sv_core::VaultResult;

const BASE_DELAY: Duration = Duration::from_millis(200);
const MAX_DELAY: Duration = Duration::from_secs(5);

fn backoff(attempt: u32) -> Duration {
    BASE_DELAY
        .saturating_mul(1u32 << attempt.min(16))
        .min(MAX_DELAY)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or has been
/// retried `max_retries` times.
pub async fn with_retry<T, F, Fut>(what: &str, max_retries: u32, mut op: F) -> VaultResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VaultResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = backoff(attempt);
                attempt += 1;
                warn!(
                    op = what,
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
