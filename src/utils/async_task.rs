use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::CoordinationError;
use crate::Result;

/// Bound a coordination-service fetch to `duration`.
///
/// Expiry maps to [`CoordinationError::Timeout`] for `path`; an error
/// from the fetch itself passes through untouched.
pub(crate) async fn fetch_with_timeout<T, F>(
    path: &str,
    duration: Duration,
    fetch: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, fetch).await {
        Ok(result) => result,
        Err(_) => {
            warn!(path, ?duration, "coordination fetch timed out");
            Err(CoordinationError::Timeout {
                path: path.to_string(),
                duration,
            }
            .into())
        }
    }
}

/// Spawn a named background task whose failure is logged rather than
/// propagated. Used for watch-triggered refreshes, which have no
/// caller to surface an error to.
pub(crate) fn spawn_logged<F, Fut>(
    name: &str,
    task_fn: F,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(err) = task_fn().await {
            warn!(task = %name, error = %err, "background refresh failed");
        }
    });
}
