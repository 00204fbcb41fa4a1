//! Inbound message pipeline.
//!
//! Every raw message delivered on a subscription goes through [`dispatch`]:
//!
//! 1. decode the envelope (undecodable messages are logged and dropped, never
//!    answered)
//! 2. build a fresh [`CallContext`]
//! 3. run the handler inside a panic boundary
//! 4. publish the reply when the sender asked for one
//!
//! Failures while building or publishing the reply are logged and go no
//! further; the caller observes them as a timeout.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures::FutureExt;

use super::handler::{Handler, HandlerPtr};
use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    to_status,
    BrokerPtr,
    CallContext,
    Code,
    Envelope,
    RawMessage,
    Result,
    RpcError,
};

/// Run one inbound message through the handler and answer it.
pub(crate) async fn dispatch(broker: BrokerPtr, handler: HandlerPtr, raw: RawMessage) {
    // ---
    let env = match Envelope::unwrap(&raw) {
        Ok(env) => env,
        Err(_err) => {
            log_warn!(
                "dropping undecodable message subject={} queue={:?}: {_err}",
                raw.subject,
                raw.queue
            );
            return;
        }
    };

    let ctx = CallContext::for_envelope(&env);
    log_debug!(
        "dispatch subject={} reply={} trace_id={} cause={} queue={:?}",
        env.subject,
        env.reply_to,
        ctx.trace_id,
        env.cause,
        env.queue
    );

    let outcome = invoke(handler.as_ref(), ctx, env.clone()).await;

    if !env.expects_reply() {
        if let Err(_err) = outcome {
            log_warn!(
                "handler failed with nobody to tell subject={} trace_id={}: {_err}",
                env.subject,
                env.id
            );
        }
        return;
    }

    let reply = match outcome {
        Ok(payload) => Envelope::reply_for(&env, payload.unwrap_or_default()),
        Err(err) => {
            log_debug!(
                "handler error subject={} trace_id={}: {err}",
                env.subject,
                env.id
            );
            Envelope::reply_for(&env, Bytes::new()).with_status(to_status(Some(&err)))
        }
    };

    let data = match reply.encode() {
        Ok(data) => data,
        Err(_err) => {
            log_error!(
                "encode reply failed subject={} trace_id={}: {_err}",
                env.subject,
                env.id
            );
            return;
        }
    };

    if let Err(_err) = broker.publish(&reply.subject, None, data).await {
        log_error!(
            "publish reply failed reply={} trace_id={}: {_err}",
            reply.subject,
            env.id
        );
    }
}

/// Call the handler, turning a panic anywhere inside it into an error.
async fn invoke(handler: &dyn Handler, ctx: CallContext, env: Envelope) -> Result<Option<Bytes>> {
    // ---
    let call = async move { handler.call(ctx, env).await };

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let err = RpcError::status(
                Code::Unknown,
                format!("recovered subscription handler panic: {}", panic_message(&*panic)),
            );
            log_error!("{err}");
            Err(err)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
