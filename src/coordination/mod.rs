//! Abstraction over the external coordination service.
//!
//! The authoritative broker topology lives in a hierarchical,
//! watch-capable key/metadata store. This module defines the seam the
//! mirror talks through: child listing and data fetch, each of which
//! also registers interest in the next change to the queried path.
//!
//! Watches are one-shot. A delivered notification consumes the
//! registration, so every configuration pass must end by fetching
//! again (which re-arms the watch) or updates stop silently. That
//! re-arming contract is owned by the registry entities, not by
//! implementations of this trait.

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::Result;

/// A one-shot change notification delivered by the coordination
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The set of children under `path` changed
    ChildrenChanged { path: String },
    /// The data stored at `path` changed
    DataChanged { path: String },
    /// The node at `path` was deleted
    NodeDeleted { path: String },
}

impl WatchEvent {
    pub fn path(&self) -> &str {
        match self {
            WatchEvent::ChildrenChanged { path } => path,
            WatchEvent::DataChanged { path } => path,
            WatchEvent::NodeDeleted { path } => path,
        }
    }
}

/// Node metadata returned alongside a data fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStat {
    /// Data version, incremented by the store on every write
    pub version: i64,
    /// Length in bytes of the stored value
    pub data_length: u32,
}

/// Subscription half of the watch protocol.
///
/// Entities register themselves (through a handle) with every fetch;
/// the coordination client invokes `changed` exactly once per
/// registration. Implementations must return promptly -- a slow
/// refresh is handed off to its own task so one entity cannot stall
/// delivery for the rest of the system.
#[async_trait]
pub trait ChangeWatcher: Send + Sync + 'static {
    async fn changed(
        &self,
        event: WatchEvent,
    );
}

/// Client surface of the coordination service consumed by the mirror.
///
/// Connection management, session handling, and delivery guarantees
/// live behind this trait. Both operations register `watcher` for one
/// future change of the respective kind before returning.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// List the children of `path` and watch it for membership changes.
    ///
    /// Raises [`crate::CoordinationError::NoNode`] if `path` itself
    /// does not exist.
    async fn get_children(
        &self,
        path: &str,
        watcher: std::sync::Arc<dyn ChangeWatcher>,
    ) -> Result<Vec<String>>;

    /// Read the value at `path` and watch it for data changes.
    async fn get_data(
        &self,
        path: &str,
        watcher: std::sync::Arc<dyn ChangeWatcher>,
    ) -> Result<(Vec<u8>, NodeStat)>;
}
