//! Bounded retry loop for transient provider failures.

use std::future::Future;

use skyrun_types::{compute_backoff, Result};

/// Run `op` up to `max_attempts` times, backing off between attempts.
///
/// Only errors marked transient are retried; anything else surfaces
/// immediately. The final transient error surfaces once the budget is
/// spent.
pub async fn with_transient_retries<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = compute_backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
