//! Resubmission on nonce conflict.

use std::future::Future;
use tracing::warn;

use crate::client::ChainResult;
use crate::config::RetryConfig;
use crate::resilience::backoff::backoff_for;

/// Run `op` until it succeeds, fails with something other than a nonce
/// conflict, or the attempt budget is spent.
///
/// `op` receives the 1-based attempt number. With retries disabled it runs once.
pub async fn retry_on_conflict<T, F, Fut>(config: &RetryConfig, mut op: F) -> ChainResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let max_attempts = if config.enabled {
        config.max_attempts.max(1)
    } else {
        1
    };

    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Err(err) if err.is_nonce_conflict() && attempt < max_attempts => {
                let delay = backoff_for(config, attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Nonce conflict, resubmitting"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
