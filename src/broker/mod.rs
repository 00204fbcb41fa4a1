//! Broker implementations.
//!
//! This module provides concrete implementations of the domain-level
//! [`Broker`](crate::Broker) trait. Adapters for external brokers are hidden
//! behind feature flags and exposed only through constructor functions.
//!
//! Domain code must not depend on broker-specific types.

mod memory;

#[cfg(feature = "transport_nats")]
mod nats;

pub use memory::{create_memory_broker, create_memory_broker_with_hub, MemoryHub};

#[cfg(feature = "transport_nats")]
pub use nats::create_nats_broker;

/// Placeholder used when NATS support is not compiled in.
///
/// # Errors
///
/// Always returns [`RpcError::Transport`](crate::RpcError::Transport).
#[cfg(not(feature = "transport_nats"))]
pub async fn create_nats_broker(
    uri: &str,
    _config: &crate::TransportConfig,
) -> crate::Result<crate::BrokerPtr> {
    // ---
    Err(crate::RpcError::Transport(format!(
        "cannot connect to {uri}: nats support not compiled in (enable feature transport_nats)"
    )))
}
