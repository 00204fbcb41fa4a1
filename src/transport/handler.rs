//! Subscription handlers.
//!
//! A [`Handler`] receives the decoded inbound [`Envelope`] together with its
//! [`CallContext`] and returns the reply payload, `None` for an empty reply,
//! or an error that the dispatcher maps into the reply status.
//!
//! Any `Fn(CallContext, Envelope) -> impl Future` closure is a handler. For
//! JSON messages, [`typed`] adapts a function over concrete request and
//! response types.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{CallContext, Envelope, Result, RpcError};

/// Boxed future returned by [`Handler::call`].
pub type HandlerFuture = BoxFuture<'static, Result<Option<Bytes>>>;

pub(crate) type HandlerPtr = Arc<dyn Handler>;

/// Business logic bound to a subscription.
///
/// Each inbound message gets its own `call`; invocations run concurrently and
/// share nothing beyond `&self`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: CallContext, env: Envelope) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(CallContext, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Bytes>>> + Send + 'static,
{
    fn call(&self, ctx: CallContext, env: Envelope) -> HandlerFuture {
        Box::pin(self(ctx, env))
    }
}

/// Adapt a typed async function into a [`Handler`].
///
/// The request payload is decoded from JSON (an empty payload reads as
/// `null`); a payload that does not decode fails the call with
/// [`Code::InvalidArgument`](crate::Code::InvalidArgument). The response is
/// encoded as JSON.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use subject_rpc::{typed, CallContext, Handler};
///
/// #[derive(Deserialize)]
/// struct SumRequest { a: i64, b: i64 }
///
/// #[derive(Serialize)]
/// struct SumResponse { sum: i64 }
///
/// let handler = typed(|_ctx: CallContext, req: SumRequest| async move {
///     Ok(SumResponse { sum: req.a + req.b })
/// });
/// # fn assert_handler<H: Handler>(_: &H) {}
/// # assert_handler(&handler);
/// ```
pub fn typed<F, Fut, Req, Resp>(f: F) -> impl Handler
where
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    // ---
    move |ctx: CallContext, env: Envelope| {
        let call = env
            .decode::<Req>()
            .map_err(|e| RpcError::invalid_argument(format!("malformed request: {e}")))
            .map(|req| f(ctx, req));
        respond(call)
    }
}

async fn respond<Fut, Resp>(call: Result<Fut>) -> Result<Option<Bytes>>
where
    Fut: Future<Output = Result<Resp>>,
    Resp: Serialize,
{
    // ---
    let resp = call?.await?;
    let bytes = serde_json::to_vec(&resp)?;
    Ok(Some(Bytes::from(bytes)))
}
