//! In-memory coordination-service double.
//!
//! Implements [`CoordinationClient`] over a flat path->node map with
//! genuine one-shot watch semantics: delivering a notification
//! consumes the registration, so an entity that fails to re-arm stops
//! hearing about changes -- exactly the failure mode the production
//! code must not have. Fetch and registration counters let tests prove
//! both "exactly one fetch" and "watch was re-armed".

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tonic::async_trait;

use crate::ChangeWatcher;
use crate::CoordinationClient;
use crate::CoordinationError;
use crate::NodeStat;
use crate::Result;
use crate::WatchEvent;

struct FakeNode {
    data: Vec<u8>,
    version: i64,
}

type WatcherMap = Mutex<HashMap<String, Vec<Arc<dyn ChangeWatcher>>>>;

pub struct FakeCoordination {
    nodes: Mutex<HashMap<String, FakeNode>>,
    child_watchers: WatcherMap,
    data_watchers: WatcherMap,
    children_fetches: AtomicUsize,
    data_fetches: AtomicUsize,
    fetch_delay: Mutex<Option<Duration>>,
}

impl FakeCoordination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(HashMap::new()),
            child_watchers: Mutex::new(HashMap::new()),
            data_watchers: Mutex::new(HashMap::new()),
            children_fetches: AtomicUsize::new(0),
            data_fetches: AtomicUsize::new(0),
            fetch_delay: Mutex::new(None),
        })
    }

    /// Make every fetch pause first, widening concurrency windows.
    pub fn set_fetch_delay(
        &self,
        delay: Duration,
    ) {
        *self.fetch_delay.lock() = Some(delay);
    }

    /// Create or replace a node, firing the parent's children watches.
    pub async fn create_node(
        &self,
        path: &str,
        value: &[u8],
    ) {
        self.nodes.lock().insert(
            path.to_string(),
            FakeNode {
                data: value.to_vec(),
                version: 0,
            },
        );
        if let Some(parent) = parent_of(path) {
            self.fire(
                &self.child_watchers,
                &parent,
                WatchEvent::ChildrenChanged { path: parent.clone() },
            )
            .await;
        }
    }

    /// Overwrite a node's value, firing its data watches.
    pub async fn set_data(
        &self,
        path: &str,
        value: &[u8],
    ) {
        if let Some(node) = self.nodes.lock().get_mut(path) {
            node.data = value.to_vec();
            node.version += 1;
        }
        self.fire(
            &self.data_watchers,
            path,
            WatchEvent::DataChanged { path: path.to_string() },
        )
        .await;
    }

    /// Remove a node, firing its data watches and the parent's
    /// children watches.
    pub async fn delete_node(
        &self,
        path: &str,
    ) {
        self.nodes.lock().remove(path);
        self.fire(
            &self.data_watchers,
            path,
            WatchEvent::NodeDeleted { path: path.to_string() },
        )
        .await;
        if let Some(parent) = parent_of(path) {
            self.fire(
                &self.child_watchers,
                &parent,
                WatchEvent::ChildrenChanged { path: parent.clone() },
            )
            .await;
        }
    }

    /// Total `get_children` calls observed
    pub fn children_fetches(&self) -> usize {
        self.children_fetches.load(Ordering::SeqCst)
    }

    /// Total `get_data` calls observed
    pub fn data_fetches(&self) -> usize {
        self.data_fetches.load(Ordering::SeqCst)
    }

    /// Children watches currently armed for `path`
    pub fn armed_children_watchers(
        &self,
        path: &str,
    ) -> usize {
        self.child_watchers.lock().get(path).map_or(0, Vec::len)
    }

    /// Data watches currently armed for `path`
    pub fn armed_data_watchers(
        &self,
        path: &str,
    ) -> usize {
        self.data_watchers.lock().get(path).map_or(0, Vec::len)
    }

    /// One-shot delivery: armed watchers for `path` are drained before
    /// notification, so only a re-registration hears the next change.
    async fn fire(
        &self,
        registry: &WatcherMap,
        path: &str,
        event: WatchEvent,
    ) {
        let armed = registry.lock().remove(path).unwrap_or_default();
        join_all(armed.iter().map(|watcher| watcher.changed(event.clone()))).await;
    }

    async fn apply_fetch_delay(&self) {
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CoordinationClient for FakeCoordination {
    async fn get_children(
        &self,
        path: &str,
        watcher: Arc<dyn ChangeWatcher>,
    ) -> Result<Vec<String>> {
        self.children_fetches.fetch_add(1, Ordering::SeqCst);
        self.apply_fetch_delay().await;

        let children = {
            let nodes = self.nodes.lock();
            if !nodes.contains_key(path) {
                return Err(CoordinationError::NoNode {
                    path: path.to_string(),
                }
                .into());
            }
            let prefix = format!("{path}/");
            nodes
                .keys()
                .filter_map(|key| key.strip_prefix(&prefix))
                .filter(|rest| !rest.contains('/'))
                .map(str::to_string)
                .collect()
        };

        self.child_watchers.lock().entry(path.to_string()).or_default().push(watcher);
        Ok(children)
    }

    async fn get_data(
        &self,
        path: &str,
        watcher: Arc<dyn ChangeWatcher>,
    ) -> Result<(Vec<u8>, NodeStat)> {
        self.data_fetches.fetch_add(1, Ordering::SeqCst);
        self.apply_fetch_delay().await;

        let (data, stat) = {
            let nodes = self.nodes.lock();
            let node = nodes.get(path).ok_or_else(|| CoordinationError::NoNode {
                path: path.to_string(),
            })?;
            (
                node.data.clone(),
                NodeStat {
                    version: node.version,
                    data_length: node.data.len() as u32,
                },
            )
        };

        self.data_watchers.lock().entry(path.to_string()).or_default().push(watcher);
        Ok((data, stat))
    }
}

fn parent_of(path: &str) -> Option<String> {
    path.rsplit_once('/').map(|(parent, _)| parent.to_string())
}
