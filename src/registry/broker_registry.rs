use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::RwLock;
use tonic::async_trait;
use tracing::debug;
use tracing::info;

use crate::constants::BROKER_IDS_PATH;
use crate::network::ConnectionCache;
use crate::utils::fetch_with_timeout;
use crate::utils::spawn_logged;
use crate::Broker;
use crate::BrokerId;
use crate::ChangeWatcher;
use crate::ConfigGate;
use crate::ConfigurationState;
use crate::CoordinationClient;
use crate::CoordinationError;
use crate::Error;
use crate::LazyConfigurable;
use crate::MirrorConfig;
use crate::RegistryError;
use crate::Result;
use crate::WatchEvent;

/// The topology of all brokers within the cluster.
///
/// Membership mirrors the children of `brokers/ids`: the first read
/// accessor triggers a children fetch that also arms a watch, and
/// every subsequent membership change re-runs the same diff-then-apply
/// pass. The registry owns exclusive creation/removal rights over its
/// [`Broker`] entries; records handed out earlier are mutated in
/// place, never replaced.
pub struct BrokerRegistry {
    members: RwLock<HashMap<BrokerId, Arc<Broker>>>,
    gate: ConfigGate,
    coordination: Arc<dyn CoordinationClient>,
    connections: Arc<ConnectionCache>,
    fetch_timeout: Duration,
    me: Weak<BrokerRegistry>,
}

impl BrokerRegistry {
    pub fn new(
        coordination: Arc<dyn CoordinationClient>,
        settings: &MirrorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            members: RwLock::new(HashMap::new()),
            gate: ConfigGate::new(),
            coordination,
            connections: Arc::new(ConnectionCache::new(settings.network.clone())),
            fetch_timeout: settings.coordination.fetch_timeout(),
            me: me.clone(),
        })
    }

    /// Number of live brokers
    pub async fn size(&self) -> Result<usize> {
        self.ensure_configured().await?;
        Ok(self.members.read().len())
    }

    /// Ids of all live brokers, in no particular order
    pub async fn ids(&self) -> Result<Vec<BrokerId>> {
        self.ensure_configured().await?;
        Ok(self.members.read().keys().copied().collect())
    }

    /// Whether `id` is currently a live member
    pub async fn contains(
        &self,
        id: BrokerId,
    ) -> Result<bool> {
        self.ensure_configured().await?;
        Ok(self.members.read().contains_key(&id))
    }

    /// The record for `id`.
    ///
    /// Raises [`RegistryError::UnknownBroker`] for an id not currently
    /// present in the membership.
    pub async fn get(
        &self,
        id: BrokerId,
    ) -> Result<Arc<Broker>> {
        self.ensure_configured().await?;
        self.members
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownBroker { id }.into())
    }

    /// All live broker records, in no particular order
    pub async fn values(&self) -> Result<Vec<Arc<Broker>>> {
        self.ensure_configured().await?;
        Ok(self.members.read().values().cloned().collect())
    }

    /// `(id, record)` pairs for all live brokers, in no particular
    /// order
    pub async fn entries(&self) -> Result<Vec<(BrokerId, Arc<Broker>)>> {
        self.ensure_configured().await?;
        Ok(self
            .members
            .read()
            .iter()
            .map(|(id, broker)| (*id, broker.clone()))
            .collect())
    }

    pub fn config_state(&self) -> ConfigurationState {
        self.gate.current()
    }

    #[cfg(test)]
    pub(crate) fn snapshot_ids(&self) -> HashSet<BrokerId> {
        self.members.read().keys().copied().collect()
    }

    fn watcher(&self) -> Arc<dyn ChangeWatcher> {
        Arc::new(RegistryWatcher {
            registry: self.me.clone(),
        })
    }

    /// Diff one children snapshot against the current membership and
    /// apply it atomically: readers observe either the old or the new
    /// membership, never a half-applied mix.
    fn apply_children_snapshot(
        &self,
        alive: HashSet<BrokerId>,
    ) {
        let mut members = self.members.write();

        for id in &alive {
            if !members.contains_key(id) {
                let broker = Broker::new(
                    *id,
                    self.coordination.clone(),
                    self.connections.clone(),
                    self.fetch_timeout,
                );
                info!(broker_id = *id, "adding new broker to registry");
                members.insert(*id, broker);
            }
        }

        let dead: Vec<BrokerId> = members.keys().filter(|id| !alive.contains(id)).copied().collect();
        for id in dead {
            if let Some(broker) = members.remove(&id) {
                info!(broker_id = id, "removing dead broker from registry");
                broker.mark_dead();
                self.connections.evict(id);
            }
        }
    }
}

#[async_trait]
impl LazyConfigurable for BrokerRegistry {
    fn gate(&self) -> &ConfigGate {
        &self.gate
    }

    /// Fetch the current child-id set under the brokers path, re-arm
    /// the children watch, and reconcile the membership against it.
    ///
    /// New ids get a fresh unconfigured record (its own first-use
    /// fetch happens lazily); vanished ids are marked dead and
    /// removed. An absent brokers root means the cluster was never
    /// bootstrapped and is reported as such, never as an empty
    /// registry.
    async fn configure(&self) -> Result<()> {
        info!(path = BROKER_IDS_PATH, "refreshing broker topology");

        let children = match fetch_with_timeout(
            BROKER_IDS_PATH,
            self.fetch_timeout,
            self.coordination.get_children(BROKER_IDS_PATH, self.watcher()),
        )
        .await
        {
            Err(Error::Coordination(CoordinationError::NoNode { path })) => {
                return Err(RegistryError::ClusterNotInitialized { path }.into());
            }
            other => other?,
        };

        // Parse every child before touching membership, so a malformed
        // id fails the pass without a half-applied diff.
        let mut alive = HashSet::with_capacity(children.len());
        for child in &children {
            let id: BrokerId = child.parse().map_err(|_| RegistryError::MalformedBrokerId {
                value: child.clone(),
                path: BROKER_IDS_PATH.to_string(),
            })?;
            alive.insert(id);
        }

        self.apply_children_snapshot(alive);
        Ok(())
    }
}

impl Debug for BrokerRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("state", &self.config_state())
            .field("size", &self.members.read().len())
            .finish()
    }
}

/// Children-watch subscription handle for the registry.
struct RegistryWatcher {
    registry: Weak<BrokerRegistry>,
}

#[async_trait]
impl ChangeWatcher for RegistryWatcher {
    async fn changed(
        &self,
        event: WatchEvent,
    ) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        debug!(event = ?event, "broker membership changed");
        spawn_logged("registry-refresh", move || async move { registry.reconfigure().await });
    }
}
