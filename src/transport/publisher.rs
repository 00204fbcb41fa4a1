//! Fire-and-forget publishing.

use bytes::Bytes;
use serde::Serialize;

use super::{check_subject, Transport};
use crate::{log_debug, Envelope, PublishOptions, Result};

impl Transport {
    // ---
    /// Publish a JSON message without expecting a reply.
    ///
    /// Returns the envelope that was sent, so the caller can record its id.
    /// Never waits for a receiver: the call succeeds even when nobody is
    /// subscribed.
    ///
    /// # Errors
    ///
    /// Serialization failures, an empty subject, or a broker send failure.
    pub async fn publish<T>(&self, subject: &str, message: &T, opts: PublishOptions) -> Result<Envelope>
    where
        T: Serialize + ?Sized + Sync,
    {
        // ---
        let payload = Bytes::from(serde_json::to_vec(message)?);
        self.publish_bytes(subject, payload, opts).await
    }

    /// Publish raw payload bytes without expecting a reply.
    pub async fn publish_bytes(
        &self,
        subject: &str,
        payload: Bytes,
        opts: PublishOptions,
    ) -> Result<Envelope> {
        // ---
        check_subject(subject)?;

        let env = Envelope::wrap(payload)
            .with_subject(subject)
            .with_cause(opts.cause.as_deref());
        let data = env.encode()?;

        log_debug!(
            "{}: publish subject={} id={} cause={}",
            self.name(),
            subject,
            env.id,
            env.cause
        );

        self.broker().publish(subject, None, data).await?;
        Ok(env)
    }
}
