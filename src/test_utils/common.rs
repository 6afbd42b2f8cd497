use std::time::Duration;

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Watch-triggered refreshes run on their own tasks, so tests that
/// mutate the fake coordination tree wait for the mirror to settle
/// instead of asserting immediately.
pub async fn wait_until<F>(
    mut condition: F,
    timeout: Duration,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Default settling window for watch propagation in tests
pub const SETTLE: Duration = Duration::from_secs(2);
