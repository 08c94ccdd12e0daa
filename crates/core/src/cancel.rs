//! Cancellation and timeout guard for suspension points
//!
//! Every network wait in the engine (token exchange, discovery download,
//! loopback wait) races the operation against the request's cancellation
//! signal and optional timeout.

use std::future::Future;
use std::time::Duration;

use grantwell_domain::{AuthError, Result};
use tokio_util::sync::CancellationToken;

/// Run `operation` until it completes, the token is canceled, or the timeout
/// elapses, whichever comes first.
pub(crate) async fn await_guarded<T>(
    cancellation: &CancellationToken,
    timeout: Option<Duration>,
    what: &str,
    operation: impl Future<Output = T>,
) -> Result<T> {
    match timeout {
        Some(limit) => {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => Err(AuthError::canceled(format!("{what} canceled"))),
                () = tokio::time::sleep(limit) => Err(AuthError::canceled(format!("{what} timed out"))),
                outcome = operation => Ok(outcome),
            }
        }
        None => {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => Err(AuthError::canceled(format!("{what} canceled"))),
                outcome = operation => Ok(outcome),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for core::cancel.
    use super::*;

    /// Validates `await_guarded` behavior for the pre-canceled scenario.
    ///
    /// Assertions:
    /// - Ensures a canceled token short-circuits with `Canceled`.
    #[tokio::test]
    async fn test_pre_canceled_token() {
        let token = CancellationToken::new();
        token.cancel();

        let result = await_guarded(&token, None, "test operation", async { 42 }).await;
        assert!(matches!(result, Err(AuthError::Canceled { .. })));
    }

    /// Validates `await_guarded` behavior for the timeout scenario.
    ///
    /// Assertions:
    /// - Ensures an operation outliving the timeout yields `Canceled`.
    #[tokio::test]
    async fn test_timeout_elapses() {
        let token = CancellationToken::new();

        let result = await_guarded(&token, Some(Duration::from_millis(10)), "slow operation", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;

        assert!(matches!(result, Err(AuthError::Canceled { .. })));
    }

    /// Validates `await_guarded` behavior for the completion scenario.
    ///
    /// Assertions:
    /// - Confirms a fast operation completes with its value.
    #[tokio::test]
    async fn test_operation_completes() {
        let token = CancellationToken::new();

        let result =
            await_guarded(&token, Some(Duration::from_secs(5)), "fast operation", async { "done" })
                .await;

        assert_eq!(result.unwrap(), "done");
    }
}
