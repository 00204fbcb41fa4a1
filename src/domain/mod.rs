//! Domain layer public interface.
//!
//! This module defines the broker abstraction the RPC core is written
//! against, independent of any concrete message bus.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod broker;

// --- Broker domain re-exports ---

pub use broker::{
    //
    Broker,
    BrokerPtr,
    BrokerSubscription,
    RawMessage,
    SubscriptionId,
};
