// src/domain/broker.rs

//! Broker domain abstractions.
//!
//! This module defines the interface the RPC core expects from the underlying
//! message bus. It intentionally avoids any reference to concrete protocols
//! or client libraries.
//!
//! The broker is responsible for subject-based delivery only: publish,
//! subscribe (optionally as a member of a competing-consumer queue group), and
//! a synchronous request primitive that generates and matches reply subjects
//! on its own. Envelopes, status mapping, panic isolation and subscription
//! bookkeeping are handled one layer up, in [`Transport`](crate::Transport).
//!
//! Concrete implementations of this interface live under `src/broker/`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::Result;

/// A message as delivered by the broker.
///
/// `reply` and `queue` are the delivery hints the envelope codec attaches to
/// the decoded envelope: the subject the sender listens on for an answer, and
/// the queue group of the subscription that received the message.
#[derive(Clone, Debug)]
pub struct RawMessage {
    // ---
    /// Subject the message was published on.
    pub subject: String,

    /// Reply subject supplied by the sender, if an answer is expected.
    pub reply: Option<String>,

    /// Queue group of the receiving subscription.
    pub queue: Option<String>,

    /// Opaque wire bytes.
    pub data: Bytes,
}

/// Broker-assigned identifier of a live subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle returned from a successful broker subscription.
///
/// Messages matching the subscription arrive on `inbox`. The inbox closes
/// once the subscription is removed via [`Broker::unsubscribe`] or the broker
/// connection is closed.
pub struct BrokerSubscription {
    // ---
    pub id: SubscriptionId,
    pub subject: String,
    pub queue: Option<String>,

    /// Receiver channel for delivered messages matching this subscription.
    pub inbox: mpsc::Receiver<RawMessage>,
}

/// Message bus abstraction.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages published *after* that
///   point on the same subject are deliverable.
/// - Among subscriptions sharing a subject and a queue group, each message is
///   delivered to exactly one member. Subscriptions without a queue group each
///   receive every message.
/// - `publish()` never waits for a consumer to process the message.
/// - `request()` returns the first reply or [`RpcError::Timeout`](crate::RpcError::Timeout)
///   once `timeout` elapses. Replies arriving later are dropped by the broker.
/// - After `close()`, every operation fails with
///   [`RpcError::ConnectionClosed`](crate::RpcError::ConnectionClosed).
///
/// The in-memory broker serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    // ---
    /// Name of this connection, used for logging.
    fn name(&self) -> &str;

    /// Publish bytes to a subject, optionally naming a reply subject.
    async fn publish(&self, subject: &str, reply: Option<&str>, data: Bytes) -> Result<()>;

    /// Publish bytes and wait up to `timeout` for the correlated reply.
    async fn request(&self, subject: &str, data: Bytes, timeout: Duration) -> Result<RawMessage>;

    /// Subscribe to a subject, optionally as a member of a queue group.
    async fn subscribe(&self, subject: &str, queue: Option<&str>) -> Result<BrokerSubscription>;

    /// Remove a subscription. Unknown ids are not an error.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Close the connection and release associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared broker pointer.
///
/// Cheap to clone; all clones share the same underlying connection.
pub type BrokerPtr = Arc<dyn Broker>;
