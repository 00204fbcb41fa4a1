//! Request/reply RPC over a subject-based publish/subscribe broker.
//!
//! This library turns a fire-and-forget message bus into an RPC substrate.
//! Every message travels in an [`Envelope`] carrying an id, a timestamp, the
//! reply subject and the id of the envelope it answers. On top of that:
//!
//! - [`Transport::request`] sends a call and waits, bounded by a timeout, for
//!   the correlated reply
//! - [`Transport::publish`] sends a notification nobody answers
//! - [`Transport::subscribe`] binds a [`Handler`] to a subject, optionally as
//!   one member of a load-balanced queue group
//! - handler failures, including panics, come back to the caller as a coded
//!   [`Status`]
//!
//! The broker itself sits behind the [`Broker`] trait. An in-process memory
//! broker is always available; NATS is behind the `transport_nats` feature.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use subject_rpc::{typed, CallContext, SubscribeOptions, TransportBuilder};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Add { a: i64, b: i64 }
//!
//! # async fn example() -> subject_rpc::Result<()> {
//! let transport = TransportBuilder::new().name("calc").build().await?;
//!
//! transport
//!     .subscribe(
//!         "math.Add",
//!         typed(|_ctx: CallContext, req: Add| async move { Ok(req.a + req.b) }),
//!         SubscribeOptions::default().with_queue_group("math.svc"),
//!     )
//!     .await?;
//!
//! let sum: i64 = transport
//!     .request("math.Add", &Add { a: 2, b: 3 }, transport.request_options())
//!     .await?;
//! assert_eq!(sum, 5);
//! # transport.close().await
//! # }
//! ```

// Import all sub modules once...
mod broker;
mod config;
mod context;
mod domain;
mod envelope;
mod error;
mod macros;
mod message_id;
mod options;
mod retry;
mod service;
mod status;
mod transport;
mod transport_builder;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// --- public re-exports
pub use broker::{create_memory_broker, create_memory_broker_with_hub, create_nats_broker, MemoryHub};
pub use config::{TransportConfig, ENV_BROKER_URI, ENV_REQUEST_TIMEOUT_MS};
pub use context::CallContext;
pub use envelope::Envelope;
pub use error::{Result, RpcError};
pub use message_id::{timestamp_nanos, MessageId};
pub use options::{PublishOptions, RequestOptions, SubscribeOptions, DEFAULT_REQUEST_TIMEOUT};
pub use retry::RetryConfig;
pub use service::{shutdown_signal, MethodDef, ServiceClient, ServiceDef, ServiceServer};
pub use status::{from_status, to_status, Code, Status};
pub use transport::{typed, Handler, HandlerFuture, SubscriptionHandle, Transport};
pub use transport_builder::TransportBuilder;

pub use domain::{
    //
    Broker,
    BrokerPtr,
    BrokerSubscription,
    RawMessage,
    SubscriptionId,
};
