// src/utils/backoff.rs
// Exponential backoff with jitter for transient infra / transport failures

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

/// Retry an async operation up to `max_attempts` times with exponential
/// backoff and full jitter. Stops retrying as soon as the operation succeeds;
/// returns the last error once attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt, "exhausted retries: {}", err
                );
                return Err(err);
            }
            Err(err) => {
                let delay = jittered_delay(base_delay, attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error: {}",
                    err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Full-jitter exponential backoff: a uniformly random delay in
/// `[0, base * 2^attempt]`, capped at a 6-step exponent. The "random" source
/// is the low bits of a monotonic clock reading, which is sufficient entropy
/// for spacing out retries without pulling in a dedicated RNG crate.
fn jittered_delay(base: Duration, attempt: u32) -> Duration {
    let cap_ms = (base.as_millis() as u64).saturating_mul(1u64 << attempt.min(6));
    let cap_ms = cap_ms.max(1);
    let entropy = Instant::now().elapsed().as_nanos() as u64 ^ (attempt as u64).wrapping_mul(2654435761);
    Duration::from_millis(entropy % cap_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            "test_op",
            5,
            Duration::from_millis(1),
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<(), &str> =
            retry_with_backoff("failing_op", 3, Duration::from_millis(1), || async {
                Err("always fails")
            })
            .await;

        assert_eq!(result, Err("always fails"));
    }
}
