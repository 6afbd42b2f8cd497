use std::time::Duration;

use dashmap::DashMap;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tracing::debug;
use tracing::trace;

use crate::registry::BrokerId;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::Result;

/// Cached broker channel plus the address it was dialed with
#[derive(Clone)]
pub(crate) struct CachedChannel {
    pub(crate) channel: Channel,
    pub(crate) address: String,
}

/// Thread-safe one-channel-per-broker cache.
///
/// A channel stays valid for as long as the broker keeps its
/// registered address. If a refresh moves the broker's `host:port`,
/// the next `get_channel` call re-dials and replaces the cached entry;
/// the registry evicts the entry outright when the broker is removed
/// as dead.
pub(crate) struct ConnectionCache {
    cache: DashMap<BrokerId, CachedChannel>,
    config: NetworkConfig,
}

impl ConnectionCache {
    pub(crate) fn new(config: NetworkConfig) -> Self {
        Self {
            cache: DashMap::new(),
            config,
        }
    }

    /// Get or create the channel for a broker.
    pub(crate) async fn get_channel(
        &self,
        id: BrokerId,
        current_address: &str,
    ) -> Result<Channel> {
        trace!(broker_id = id, address = current_address, "broker channel lookup");

        // Fast path: cached channel still points at the broker's
        // registered address
        if let Some(entry) = self.cache.get(&id) {
            if entry.address == current_address {
                return Ok(entry.channel.clone());
            }
        }

        // Slow path: first use, or the broker moved
        debug!(broker_id = id, address = current_address, "establishing new broker connection");
        let channel = self.create_channel(id, current_address).await?;

        self.cache.insert(
            id,
            CachedChannel {
                channel: channel.clone(),
                address: current_address.to_string(),
            },
        );

        Ok(channel)
    }

    /// Create a pre-configured endpoint and connect
    async fn create_channel(
        &self,
        id: BrokerId,
        address: &str,
    ) -> Result<Channel> {
        let params = &self.config.broker;

        Endpoint::try_from(address.to_string())
            .map_err(|_| NetworkError::InvalidUri(address.to_string()))?
            .connect_timeout(Duration::from_millis(params.connect_timeout_in_ms))
            .timeout(Duration::from_millis(params.request_timeout_in_ms))
            .tcp_keepalive(Some(Duration::from_secs(params.tcp_keepalive_in_secs)))
            .http2_keep_alive_interval(Duration::from_secs(
                params.http2_keep_alive_interval_in_secs,
            ))
            .keep_alive_timeout(Duration::from_secs(params.http2_keep_alive_timeout_in_secs))
            .initial_connection_window_size(params.connection_window_size)
            .initial_stream_window_size(params.stream_window_size)
            .connect()
            .await
            .map_err(|e| {
                NetworkError::ConnectError {
                    id,
                    address: address.to_string(),
                    source: Box::new(e),
                }
                .into()
            })
    }

    /// Drop a broker's cached channel
    pub(crate) fn evict(
        &self,
        id: BrokerId,
    ) {
        self.cache.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn insert_channel(
        &self,
        id: BrokerId,
        address: &str,
        channel: Channel,
    ) {
        self.cache.insert(
            id,
            CachedChannel {
                channel,
                address: address.to_string(),
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn contains(
        &self,
        id: BrokerId,
    ) -> bool {
        self.cache.contains_key(&id)
    }
}
