//! Bounded retry for local commits

use crate::error::{Error, Result};
use std::future::Future;
use tracing::warn;

/// Run `unit_of_work` up to `attempts` times.
///
/// Only errors for which [`Error::is_retryable`] holds trigger another
/// attempt; anything else is returned immediately. When every attempt
/// conflicts the last conflict is surfaced as `Error::TransientCommit`.
/// The closure receives the 1-based attempt number.
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut unit_of_work: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match unit_of_work(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    "Attempt {}/{} rolled back ({}), retrying",
                    attempt, attempts, e
                );
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                warn!("Giving up after {} attempts: {}", attempts, e);
                return Err(Error::TransientCommit {
                    attempts,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}
