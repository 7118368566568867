//! Single retry for storage outages.

use licensor_core::{Error, Result};
use std::future::Future;
use tracing::warn;

/// Run `op`, running it once more if storage was unavailable.
///
/// Only used for operations that are safe to repeat: reads, checks,
/// activation and revocation.
pub async fn retry_once<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(Error::StorageUnavailable(reason)) => {
            warn!(%reason, "Storage unavailable, retrying once");
            op().await
        }
        other => other,
    }
}
