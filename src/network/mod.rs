//! Wire-protocol connection management for brokers.
//!
//! The mirror does not speak the log protocol itself; it hands out one
//! long-lived gRPC channel per broker, dialed on first use from the
//! broker's registered `host:port`.

mod connection_cache;
pub(crate) use connection_cache::*;
