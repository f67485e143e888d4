//! Deadline wrapper for awaited operations.
//!
//! The wrapper races the operation against a timer; it does NOT cancel
//! the operation. The future is spawned onto the runtime, so on timeout
//! the in-flight call keeps running in the background and any side
//! effects it produces (a real provider charge, an oracle write) are not
//! reclaimed. Callers that need true cancellation must thread a
//! cancellation signal into the operation itself.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Floor applied to every deadline to guard against pathological config.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Dedicated timeout marker. Sentinel checked first by the error mapper.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation timed out")]
pub struct Elapsed;

/// Run `operation` with a deadline of `limit` (clamped to [`MIN_TIMEOUT`]).
///
/// Returns `Err(Elapsed)` if the operation has not settled in time. The
/// timer is dropped on either settlement path, so nothing leaks.
pub async fn with_timeout<F, T>(limit: Duration, operation: F) -> Result<T, Elapsed>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let limit = limit.max(MIN_TIMEOUT);
    let handle = tokio::spawn(operation);

    tokio::select! {
        joined = handle => match joined {
            Ok(value) => Ok(value),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Task aborted externally: indistinguishable from never settling.
            Err(_) => Err(Elapsed),
        },
        () = tokio::time::sleep(limit) => Err(Elapsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_operation_settles() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out() {
        let result = with_timeout(Duration::from_millis(300), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        })
        .await;
        assert_eq!(result, Err(Elapsed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_clamped_to_floor() {
        // A zero deadline still grants the 250ms floor.
        let result = with_timeout(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            "done"
        })
        .await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_survives_timeout() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let result = with_timeout(Duration::from_millis(300), async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send("still ran");
        })
        .await;
        assert_eq!(result, Err(Elapsed));

        // The spawned operation keeps running past the deadline.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.await, Ok("still ran"));
    }
}
