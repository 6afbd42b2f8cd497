//! The in-process mirror of the cluster's broker topology.
//!
//! [`BrokerRegistry`] tracks the set of live brokers as the single
//! source of truth for membership, synchronized against the
//! coordination service's children of `brokers/ids`. Each member is a
//! [`Broker`] record that configures itself lazily from its own node
//! and refreshes in place on every data-watch delivery, so references
//! handed out earlier always observe current fields. The registry owns
//! exclusive insert/remove rights over the membership map; records
//! only ever mutate their own fields.

mod broker;
mod broker_registry;
pub use broker::*;
pub use broker_registry::*;
