//! Request/reply calls.
//!
//! Correlation is the broker's job: the request primitive generates the reply
//! subject and hands back the matching message, so there is no local pending
//! table and no locking on this path. Concurrent requests on one transport are
//! independent.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{check_subject, Transport};
use crate::retry::retry_with_backoff;
use crate::{from_status, log_debug, Envelope, RequestOptions, Result};

impl Transport {
    // ---
    /// Send a JSON request and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Timeout`](crate::RpcError::Timeout) when no reply arrives
    ///   within `opts.timeout`, and other transport errors from the broker
    /// - [`RpcError::Decode`](crate::RpcError::Decode) when the reply envelope
    ///   or its payload cannot be decoded
    /// - [`RpcError::Status`](crate::RpcError::Status) carrying the code and
    ///   message the handler failed with
    pub async fn request<Req, Resp>(&self, subject: &str, req: &Req, opts: RequestOptions) -> Result<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        // ---
        let (_reply, resp) = self.request_with_reply(subject, req, opts).await?;
        Ok(resp)
    }

    /// Like [`request`](Self::request), also returning the reply envelope.
    pub async fn request_with_reply<Req, Resp>(
        &self,
        subject: &str,
        req: &Req,
        opts: RequestOptions,
    ) -> Result<(Envelope, Resp)>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        // ---
        let payload = Bytes::from(serde_json::to_vec(req)?);
        let reply = self.request_bytes(subject, payload, opts).await?;
        let resp = reply.decode()?;
        Ok((reply, resp))
    }

    /// Send raw payload bytes and wait for the reply envelope.
    ///
    /// The returned envelope always has an OK status; a failed status comes
    /// back as the error instead. With `opts.retry` set, transport failures
    /// are retried with a fresh envelope per attempt.
    pub async fn request_bytes(
        &self,
        subject: &str,
        payload: Bytes,
        opts: RequestOptions,
    ) -> Result<Envelope> {
        // ---
        check_subject(subject)?;

        retry_with_backoff(opts.retry.as_ref(), || {
            let payload = payload.clone();
            let opts = &opts;
            async move { self.request_once(subject, payload, opts).await }
        })
        .await
    }

    async fn request_once(
        &self,
        subject: &str,
        payload: Bytes,
        opts: &RequestOptions,
    ) -> Result<Envelope> {
        // ---
        let env = Envelope::wrap(payload)
            .with_subject(subject)
            .with_cause(opts.cause.as_deref());
        let data = env.encode()?;

        log_debug!(
            "{}: request subject={} id={} cause={} timeout={:?}",
            self.name(),
            subject,
            env.id,
            env.cause,
            opts.timeout
        );

        let raw = self.broker().request(subject, data, opts.timeout).await?;
        let reply = Envelope::unwrap(&raw)?;

        if let Some(err) = from_status(&reply.effective_status()) {
            return Err(err);
        }
        Ok(reply)
    }
}
