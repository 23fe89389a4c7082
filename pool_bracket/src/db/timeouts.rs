//! Store operation timeout helpers
//!
//! Every Postgres round-trip goes through one of these so a stuck connection
//! surfaces as [`StoreError::Timeout`] instead of hanging a generation run.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use super::errors::{StoreError, StoreResult};

/// Single-statement reads
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lock acquire and release transactions
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Batch commits such as a full bracket tree
pub const LONG_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Race `future` against `duration`, converting its error into [`StoreError`]
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    StoreError: From<E>,
{
    timeout(duration, future)
        .await
        .map_err(|_| StoreError::Timeout(duration))?
        .map_err(StoreError::from)
}

/// [`with_timeout`] using [`DEFAULT_QUERY_TIMEOUT`]
pub async fn with_default_timeout<F, T, E>(future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    StoreError: From<E>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}

/// [`with_timeout`] using [`LONG_OPERATION_TIMEOUT`]
pub async fn with_long_timeout<F, T, E>(future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    StoreError: From<E>,
{
    with_timeout(LONG_OPERATION_TIMEOUT, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_constants() {
        assert_eq!(DEFAULT_QUERY_TIMEOUT.as_secs(), 5);
        assert_eq!(DEFAULT_TRANSACTION_TIMEOUT.as_secs(), 10);
        assert_eq!(LONG_OPERATION_TIMEOUT.as_secs(), 30);
    }

    #[tokio::test]
    async fn test_elapsed_future_maps_to_timeout() {
        let result: StoreResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_inner_error_is_preserved() {
        let result: StoreResult<()> = with_default_timeout(async {
            Err::<(), _>(StoreError::Unavailable("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
