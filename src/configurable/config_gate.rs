//! Deferred configuration for entities mirroring remote state.
//!
//! An entity populated from the coordination service does not fetch at
//! construction time. The first accessor that needs remote state runs
//! one synchronous fetch-and-populate pass; every watch delivery for
//! the entity's path re-runs the same pass. Both entry points are
//! serialized per entity through [`ConfigGate`], so concurrent first
//! readers trigger exactly one fetch and concurrent refreshes never
//! interleave partial writes.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tonic::async_trait;

use crate::Result;

/// Where an entity stands in its fetch-and-populate lifecycle.
///
/// `Unconfigured -> Configuring -> Configured` on first use, then
/// `Configured -> Configuring -> Configured` on every refresh. A
/// configured entity never reverts to `Unconfigured`; a failed pass
/// restores whatever state preceded the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationState {
    Unconfigured,
    Configuring,
    Configured,
}

/// Per-entity gate serializing configuration passes.
///
/// Holds the observable [`ConfigurationState`] plus the critical
/// section every pass must run inside.
pub struct ConfigGate {
    state: RwLock<ConfigurationState>,
    configured_once: AtomicBool,
    pass: Mutex<()>,
}

impl Default for ConfigGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigGate {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConfigurationState::Unconfigured),
            configured_once: AtomicBool::new(false),
            pass: Mutex::new(()),
        }
    }

    pub fn current(&self) -> ConfigurationState {
        *self.state.read()
    }

    /// Whether at least one configuration pass has completed.
    ///
    /// Stays true across later refreshes, so accessors that only need
    /// "populated at least once" keep reading the last-applied fields
    /// without blocking on an in-flight refresh.
    pub fn is_configured(&self) -> bool {
        self.configured_once.load(Ordering::Acquire)
    }

    fn set(
        &self,
        state: ConfigurationState,
    ) {
        *self.state.write() = state;
    }

    /// Enter the entity's critical section and mark it `Configuring`.
    ///
    /// The returned guard restores the pre-pass state on drop unless
    /// [`ConfigPass::complete`] is called, so an error path needs no
    /// explicit rollback.
    pub(crate) async fn begin_pass(&self) -> ConfigPass<'_> {
        let permit = self.pass.lock().await;
        let prior = self.current();
        self.set(ConfigurationState::Configuring);
        ConfigPass {
            gate: self,
            prior,
            done: false,
            _permit: permit,
        }
    }
}

impl std::fmt::Debug for ConfigGate {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfigGate").field("state", &self.current()).finish()
    }
}

/// An in-progress configuration pass. Exactly one exists per entity at
/// a time.
pub(crate) struct ConfigPass<'a> {
    gate: &'a ConfigGate,
    prior: ConfigurationState,
    done: bool,
    _permit: MutexGuard<'a, ()>,
}

impl ConfigPass<'_> {
    /// Mark the pass successful, transitioning to `Configured`.
    pub(crate) fn complete(mut self) {
        self.done = true;
        self.gate.set(ConfigurationState::Configured);
        self.gate.configured_once.store(true, Ordering::Release);
    }
}

impl Drop for ConfigPass<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.gate.set(self.prior);
        }
    }
}

/// An entity whose fields depend on remote state.
///
/// `configure` performs one fetch-and-populate pass and, as its last
/// step, re-registers the entity's watch so the next remote change
/// triggers another pass. Accessors call `ensure_configured` before
/// reading any dependent field; watch deliveries call `reconfigure`.
#[async_trait]
pub trait LazyConfigurable: Send + Sync {
    fn gate(&self) -> &ConfigGate;

    /// One fetch-and-populate pass. Runs only inside the gate's
    /// critical section.
    async fn configure(&self) -> Result<()>;

    /// Make sure at least one configuration pass has completed,
    /// running it if needed. Concurrent callers on an unconfigured
    /// entity serialize on the gate; whoever arrives after the pass
    /// completed returns without fetching again.
    async fn ensure_configured(&self) -> Result<()> {
        if self.gate().is_configured() {
            return Ok(());
        }
        let pass = self.gate().begin_pass().await;
        if self.gate().is_configured() {
            // Lost the race: another caller configured while we
            // waited for the gate. Dropping the pass restores
            // `Configured`.
            return Ok(());
        }
        self.configure().await.map(|()| pass.complete())
    }

    /// Re-run the configuration pass after a watch delivery. A failure
    /// leaves both the entity's fields and its state as they were.
    async fn reconfigure(&self) -> Result<()> {
        let pass = self.gate().begin_pass().await;
        self.configure().await.map(|()| pass.complete())
    }
}
