//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, TychoError};

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TychoError::Timeout(duration.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_timer_maps_to_timeout_error() {
        let err = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .expect_err("sleep should outlast the timeout");
        assert!(matches!(err, TychoError::Timeout(50)));
    }

    #[tokio::test]
    async fn completed_future_passes_through() {
        let value = with_timeout(Duration::from_secs(1), async { Ok(7) })
            .await
            .expect("future should finish first");
        assert_eq!(value, 7);
    }
}
