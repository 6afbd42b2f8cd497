//! Error hierarchy for the broker topology mirror.
//!
//! Failures are categorized by the collaborator they originate from:
//! the coordination service, the registry's own bookkeeping, the wire
//! protocol layer, or configuration loading. A failed configuration
//! pass never poisons in-memory state; callers decide whether to
//! retry.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures talking to the coordination service
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Registry bookkeeping failures (membership, node data)
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Wire-protocol connection failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Configuration loading/validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by the coordination-service collaborator.
///
/// `NoNode` is the distinguished "no such node" condition; the registry
/// maps it to [`RegistryError::ClusterNotInitialized`] when the brokers
/// root itself is missing.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// The requested path does not exist
    #[error("no node at \"{path}\"")]
    NoNode { path: String },

    /// A fetch did not complete within the configured bound
    #[error("fetch from \"{path}\" timed out after {duration:?}")]
    Timeout { path: String, duration: Duration },

    /// The session to the coordination service dropped mid-request
    #[error("coordination connection lost: {0}")]
    ConnectionLoss(String),

    /// The coordination session expired and must be re-established
    #[error("coordination session expired")]
    SessionExpired,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The brokers root path is absent. The cluster was never
    /// bootstrapped, which is distinct from "no brokers currently
    /// alive".
    #[error("the path \"{path}\" does not exist in the coordination service -- is the cluster running?")]
    ClusterNotInitialized { path: String },

    /// Lookup of an id not currently present in the membership
    #[error("unknown broker id: {id}")]
    UnknownBroker { id: u32 },

    /// A broker node value that does not parse as `creator:host:port`
    #[error("malformed broker node for id {id}: {reason}")]
    MalformedBrokerNode { id: u32, reason: String },

    /// A child of the brokers root that is not a decimal broker id
    #[error("malformed broker id \"{value}\" under \"{path}\"")]
    MalformedBrokerId { value: String, path: String },

    /// Endpoint read on a record whose configuration never completed
    #[error("broker {id} has no configured endpoint")]
    EndpointUnavailable { id: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Malformed broker addresses
    #[error("invalid URI format: {0}")]
    InvalidUri(String),

    /// Persistent connection failures
    #[error("failed to connect to broker {id} at {address}")]
    ConnectError {
        id: u32,
        address: String,
        #[source]
        source: Box<tonic::transport::Error>,
    },
}
