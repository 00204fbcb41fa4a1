//! RPC core over a [`Broker`](crate::Broker).
//!
//! A [`Transport`] owns one broker connection and layers the envelope
//! protocol on top of it:
//!
//! - `publisher`: fire-and-forget [`Transport::publish`]
//! - `requester`: [`Transport::request`] with a bounded wait for the reply
//! - `dispatcher`: the per-message pipeline behind every subscription
//! - `registry`: [`Transport::subscribe`] and bulk teardown on close
//!
//! The broker connection is shared by all of these and safe for concurrent
//! use. `Transport` is cheap to clone (internally `Arc`-backed).

mod dispatcher;
mod handler;
mod publisher;
mod registry;
mod requester;

use std::fmt;
use std::sync::Arc;

pub use handler::{typed, Handler, HandlerFuture};
pub use registry::SubscriptionHandle;

pub(crate) use handler::HandlerPtr;

use registry::Registry;

use crate::{BrokerPtr, RequestOptions, Result, RpcError, SubscribeOptions, TransportConfig};

/// Running transport instance.
///
/// # Example
///
/// ```
/// use subject_rpc::{
///     create_memory_broker, typed, CallContext, RequestOptions, SubscribeOptions, Transport,
///     TransportConfig,
/// };
///
/// # async fn example() -> subject_rpc::Result<()> {
/// let config = TransportConfig::memory("doc-echo");
/// let transport = Transport::new(create_memory_broker(&config).await?, config);
///
/// transport
///     .subscribe(
///         "doc.Echo",
///         typed(|_ctx: CallContext, msg: String| async move { Ok(msg) }),
///         SubscribeOptions::default(),
///     )
///     .await?;
///
/// let reply: String = transport
///     .request("doc.Echo", "hello", RequestOptions::default())
///     .await?;
/// assert_eq!(reply, "hello");
///
/// transport.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    broker: BrokerPtr,
    registry: Registry,
    config: TransportConfig,
}

impl Transport {
    // ---
    /// Wrap an already connected broker.
    pub fn new(broker: BrokerPtr, config: TransportConfig) -> Self {
        // ---
        let registry = Registry::new(broker.clone());
        Self {
            inner: Arc::new(Inner {
                broker,
                registry,
                config,
            }),
        }
    }

    /// Name of this transport instance (from the config).
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn broker(&self) -> &BrokerPtr {
        &self.inner.broker
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Request options seeded with this transport's default timeout.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::default().with_timeout(self.inner.config.request_timeout)
    }

    /// Bind `handler` to `subject`.
    ///
    /// With `opts.queue_group` set, subscribers sharing the subject and group
    /// compete: each message reaches exactly one of them. Without it, every
    /// subscriber receives every message.
    ///
    /// # Errors
    ///
    /// [`RpcError::ConnectionClosed`] after [`close`](Self::close), an empty
    /// subject, or a broker subscribe failure.
    pub async fn subscribe<H>(
        &self,
        subject: &str,
        handler: H,
        opts: SubscribeOptions,
    ) -> Result<SubscriptionHandle>
    where
        H: Handler,
    {
        self.subscribe_shared(subject, Arc::new(handler), opts).await
    }

    pub(crate) async fn subscribe_shared(
        &self,
        subject: &str,
        handler: HandlerPtr,
        opts: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        // ---
        check_subject(subject)?;
        self.inner.registry.subscribe(subject, handler, opts).await
    }

    /// Remove a single subscription.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        self.inner.registry.unsubscribe(handle).await
    }

    /// Snapshot of the live subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionHandle> {
        self.inner.registry.handles()
    }

    /// Unsubscribe everything, then close the broker connection.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn close(&self) -> Result<()> {
        self.inner.registry.close().await
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.inner.config.name)
            .field("broker", &self.inner.broker.name())
            .field("subscriptions", &self.inner.registry.handles().len())
            .finish()
    }
}

pub(crate) fn check_subject(subject: &str) -> Result<()> {
    if subject.is_empty() || subject.contains(char::is_whitespace) {
        Err(RpcError::InvalidSubject(subject.to_string()))
    } else {
        Ok(())
    }
}
