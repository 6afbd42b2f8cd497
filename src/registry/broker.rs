use std::fmt::Debug;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::RwLock;
use tonic::async_trait;
use tonic::transport::Channel;
use tracing::debug;

use crate::constants::broker_node_path;
use crate::network::ConnectionCache;
use crate::utils::fetch_with_timeout;
use crate::utils::spawn_logged;
use crate::ChangeWatcher;
use crate::ConfigGate;
use crate::ConfigurationState;
use crate::CoordinationClient;
use crate::LazyConfigurable;
use crate::RegistryError;
use crate::Result;
use crate::WatchEvent;

/// Stable numeric broker identity within a cluster snapshot
pub type BrokerId = u32;

/// A broker's registered network location.
///
/// Host and port are parsed together from one node value and replaced
/// together, so a record never exposes a half-updated pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    /// Parse a `creator:host:port` registration value.
    pub(crate) fn parse(
        id: BrokerId,
        raw: &[u8],
    ) -> Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| RegistryError::MalformedBrokerNode {
            id,
            reason: "value is not UTF-8".to_string(),
        })?;

        let mut fields = text.split(':');
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(_creator), Some(host), Some(port), None) => {
                let port: u16 = port.parse().map_err(|_| RegistryError::MalformedBrokerNode {
                    id,
                    reason: format!("port \"{port}\" is not a number"),
                })?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Err(RegistryError::MalformedBrokerNode {
                id,
                reason: format!("expected creator:host:port, got \"{text}\""),
            }
            .into()),
        }
    }

    /// Dialable address for this endpoint
    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// One broker of the log cluster.
///
/// Created by [`crate::BrokerRegistry`] when its id appears under the
/// brokers path; populated lazily from `brokers/ids/<id>` on first
/// field access; refreshed in place whenever that node's data watch
/// fires. The registry marks the record dead and drops it from the
/// membership when the id disappears -- a reference held by a caller
/// stays valid and inspectable, it just stops receiving updates.
pub struct Broker {
    id: BrokerId,
    endpoint: RwLock<Option<BrokerEndpoint>>,
    is_dead: AtomicBool,
    gate: ConfigGate,
    coordination: Arc<dyn CoordinationClient>,
    connections: Arc<ConnectionCache>,
    fetch_timeout: Duration,
    me: Weak<Broker>,
}

impl Broker {
    pub(crate) fn new(
        id: BrokerId,
        coordination: Arc<dyn CoordinationClient>,
        connections: Arc<ConnectionCache>,
        fetch_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id,
            endpoint: RwLock::new(None),
            is_dead: AtomicBool::new(false),
            gate: ConfigGate::new(),
            coordination,
            connections,
            fetch_timeout,
            me: me.clone(),
        })
    }

    /// Broker id, fixed at construction
    pub fn id(&self) -> BrokerId {
        self.id
    }

    /// Whether the registry has removed this broker from the
    /// membership. A dead record is never mutated again.
    pub fn is_dead(&self) -> bool {
        self.is_dead.load(Ordering::Acquire)
    }

    pub fn config_state(&self) -> ConfigurationState {
        self.gate.current()
    }

    /// The host the broker is reachable at; configures on first call.
    pub async fn host(&self) -> Result<String> {
        Ok(self.endpoint().await?.host)
    }

    /// The port the broker is reachable at; configures on first call.
    pub async fn port(&self) -> Result<u16> {
        Ok(self.endpoint().await?.port)
    }

    /// The broker's registered endpoint; configures on first call.
    pub async fn endpoint(&self) -> Result<BrokerEndpoint> {
        self.ensure_configured().await?;
        self.last_endpoint()
            .ok_or_else(|| RegistryError::EndpointUnavailable { id: self.id }.into())
    }

    /// Last successfully parsed endpoint, without triggering a fetch.
    pub fn last_endpoint(&self) -> Option<BrokerEndpoint> {
        self.endpoint.read().clone()
    }

    /// The wire-protocol channel for this broker.
    ///
    /// One channel is kept per broker; it is re-dialed transparently
    /// if the broker's registered address has moved since it was
    /// built.
    pub async fn channel(&self) -> Result<Channel> {
        let endpoint = self.endpoint().await?;
        self.connections.get_channel(self.id, &endpoint.uri()).await
    }

    /// Registry-only: called while the id is being removed from the
    /// membership.
    pub(crate) fn mark_dead(&self) {
        self.is_dead.store(true, Ordering::Release);
    }

    fn watcher(&self) -> Arc<dyn ChangeWatcher> {
        Arc::new(BrokerWatcher {
            broker: self.me.clone(),
        })
    }
}

#[async_trait]
impl LazyConfigurable for Broker {
    fn gate(&self) -> &ConfigGate {
        &self.gate
    }

    /// Fetch this broker's node, re-arm its data watch, and replace
    /// the endpoint. A parse failure surfaces as a data-format error
    /// and leaves the last-known-good endpoint untouched.
    async fn configure(&self) -> Result<()> {
        let path = broker_node_path(self.id);
        debug!(broker_id = self.id, path = %path, "fetching broker data");

        let (data, _stat) = fetch_with_timeout(
            &path,
            self.fetch_timeout,
            self.coordination.get_data(&path, self.watcher()),
        )
        .await?;

        let endpoint = BrokerEndpoint::parse(self.id, &data)?;
        *self.endpoint.write() = Some(endpoint);
        Ok(())
    }
}

impl Debug for Broker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("id", &self.id)
            .field("is_dead", &self.is_dead())
            .finish()
    }
}

/// Data-watch subscription handle for one broker.
///
/// Holds a `Weak` reference so an armed watch never keeps a dropped
/// record alive; the refresh runs on its own task so one slow broker
/// cannot stall watch delivery for the rest of the system.
struct BrokerWatcher {
    broker: Weak<Broker>,
}

#[async_trait]
impl ChangeWatcher for BrokerWatcher {
    async fn changed(
        &self,
        event: WatchEvent,
    ) {
        let Some(broker) = self.broker.upgrade() else {
            return;
        };
        if broker.is_dead() {
            // A record is never mutated again after the registry
            // removed it; late deliveries for its node are dropped.
            return;
        }
        debug!(broker_id = broker.id(), event = ?event, "broker node changed");
        spawn_logged("broker-refresh", move || async move { broker.reconfigure().await });
    }
}
