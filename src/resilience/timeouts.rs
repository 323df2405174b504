//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls and probes with a deadline
//! - Keep timeouts distinguishable from other failures
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the timed-out future is dropped
//! - Timeouts are the only cancellation mechanism

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Outcome of a bounded call that did not succeed.
#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Failed(E),
}

/// Run `call`, giving up after `limit`.
pub async fn bounded<F, T, E>(limit: Duration, call: F) -> Result<T, CallError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CallError::Failed(e)),
        Err(_) => Err(CallError::Timeout(limit)),
    }
}
