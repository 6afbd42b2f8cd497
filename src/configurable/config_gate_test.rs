use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tonic::async_trait;

use super::ConfigGate;
use super::ConfigurationState;
use super::LazyConfigurable;
use crate::CoordinationError;
use crate::Result;

/// Minimal lazily-configured entity: counts passes, optionally fails
/// the next one, optionally stalls inside the pass.
struct StubEntity {
    gate: ConfigGate,
    configure_calls: AtomicUsize,
    fail_next: AtomicBool,
    delay: Option<Duration>,
}

impl StubEntity {
    fn new(delay: Option<Duration>) -> Self {
        Self {
            gate: ConfigGate::new(),
            configure_calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            delay,
        }
    }

    fn calls(&self) -> usize {
        self.configure_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LazyConfigurable for StubEntity {
    fn gate(&self) -> &ConfigGate {
        &self.gate
    }

    async fn configure(&self) -> Result<()> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CoordinationError::ConnectionLoss("stub".to_string()).into());
        }
        Ok(())
    }
}

/// # Case 1: First access runs exactly one pass
///
/// ## Validation criteria
/// 1. State starts `Unconfigured` and ends `Configured`
/// 2. A second `ensure_configured` does not fetch again
#[tokio::test]
async fn test_ensure_configured_case1_single_pass() {
    let entity = StubEntity::new(None);
    assert_eq!(entity.gate().current(), ConfigurationState::Unconfigured);

    entity.ensure_configured().await.expect("first pass should succeed");
    assert_eq!(entity.gate().current(), ConfigurationState::Configured);
    assert_eq!(entity.calls(), 1);

    entity.ensure_configured().await.expect("fast path should succeed");
    assert_eq!(entity.calls(), 1);
}

/// # Case 2: A failed first pass restores `Unconfigured` and a retry
/// works
///
/// ## Validation criteria
/// 1. The error surfaces to the caller
/// 2. State is back to `Unconfigured` afterwards
/// 3. The next `ensure_configured` runs a fresh pass and succeeds
#[tokio::test]
async fn test_ensure_configured_case2_failure_restores_state() {
    let entity = StubEntity::new(None);
    entity.fail_next.store(true, Ordering::SeqCst);

    let result = entity.ensure_configured().await;
    assert!(result.is_err());
    assert_eq!(entity.gate().current(), ConfigurationState::Unconfigured);

    entity.ensure_configured().await.expect("retry should succeed");
    assert_eq!(entity.gate().current(), ConfigurationState::Configured);
    assert_eq!(entity.calls(), 2);
}

/// # Case 3: A failed refresh leaves the entity `Configured`
///
/// A configured entity never reverts to `Unconfigured`; the failed
/// attempt is reported but the state (and whatever fields the pass
/// would have replaced) stay as they were.
#[tokio::test]
async fn test_reconfigure_case3_failure_keeps_configured() {
    let entity = StubEntity::new(None);
    entity.ensure_configured().await.expect("first pass should succeed");

    entity.fail_next.store(true, Ordering::SeqCst);
    let result = entity.reconfigure().await;
    assert!(result.is_err());
    assert_eq!(entity.gate().current(), ConfigurationState::Configured);
}

/// # Case 4: Refresh re-runs the pass on a configured entity
#[tokio::test]
async fn test_reconfigure_case4_runs_pass_again() {
    let entity = StubEntity::new(None);
    entity.ensure_configured().await.expect("first pass should succeed");
    entity.reconfigure().await.expect("refresh should succeed");

    assert_eq!(entity.calls(), 2);
    assert_eq!(entity.gate().current(), ConfigurationState::Configured);
}

/// # Case 5: Concurrent first accesses trigger exactly one pass
///
/// ## Setup
/// 1. The pass stalls 50ms so all callers arrive while it is running
///
/// ## Validation criteria
/// 1. All callers succeed
/// 2. `configure` ran exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ensure_configured_case5_concurrent_first_access() {
    let entity = Arc::new(StubEntity::new(Some(Duration::from_millis(50))));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let entity = entity.clone();
        handles.push(tokio::spawn(async move { entity.ensure_configured().await }));
    }
    for handle in handles {
        handle.await.expect("task should not panic").expect("caller should succeed");
    }

    assert_eq!(entity.calls(), 1);
    assert_eq!(entity.gate().current(), ConfigurationState::Configured);
}

/// # Case 6: Readers do not block on an in-flight refresh
///
/// ## Setup
/// 1. Entity is configured, then a slow refresh starts in the
///    background
///
/// ## Validation criteria
/// 1. `ensure_configured` returns while the refresh is still running,
///    without triggering another pass
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ensure_configured_case6_no_block_during_refresh() {
    let entity = Arc::new(StubEntity::new(Some(Duration::from_millis(300))));
    entity.ensure_configured().await.expect("first pass should succeed");
    assert_eq!(entity.calls(), 1);

    let refresher = entity.clone();
    let refresh = tokio::spawn(async move { refresher.reconfigure().await });

    // Let the refresh enter its pass
    assert!(
        crate::test_utils::wait_until(|| entity.calls() == 2, Duration::from_secs(2)).await,
        "refresh should have started"
    );

    let started = tokio::time::Instant::now();
    entity.ensure_configured().await.expect("reader should not block");
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "reader should return while the refresh is still in flight"
    );
    assert_eq!(entity.calls(), 2);

    refresh.await.expect("task should not panic").expect("refresh should succeed");
}
