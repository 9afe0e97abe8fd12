//! Bounded store round trips.

use std::future::Future;
use std::time::Duration;

use subtrack_core::{Result, SubTrackError};

/// Run `fut`, turning an elapsed `limit` into `SubTrackError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SubTrackError::Timeout(format!("{what} exceeded {}ms", limit.as_millis()))),
    }
}
