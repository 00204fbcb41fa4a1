//! Wire envelope and codec.
//!
//! Every message exchanged over the bus is an [`Envelope`] serialized as
//! JSON. The envelope carries the routing and correlation metadata the RPC
//! layer needs; the application message travels as opaque `payload` bytes,
//! itself JSON encoded by the typed helpers in this crate.
//!
//! # Wire format
//!
//! ```text
//! {
//!   "id":        "9f1c…",          // always present, unique per envelope
//!   "timestamp": 1718000000000000,  // ns since Unix epoch
//!   "subject":   "example.Sum",
//!   "reply_to":  "",                // empty: no reply expected
//!   "cause":     "",                // id of the envelope being answered
//!   "payload":   [123, 125],        // raw bytes
//!   "status":    {"code": 12, "message": "nope"},  // absent on success
//!   "error":     "nope"             // legacy mirror of a failed status
//! }
//! ```
//!
//! Receivers accept envelopes from legacy peers that only populate `error`:
//! a non-empty `error` with no `status` reads as [`Code::Unknown`].
//!
//! `queue` is delivery metadata attached on receipt and is never serialized.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::message_id::{timestamp_nanos, MessageId};
use crate::status::{Code, Status};
use crate::{RawMessage, Result, RpcError};

/// The unit exchanged over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    // ---
    /// Unique id, generated when the envelope is wrapped.
    pub id: String,

    /// Creation time in nanoseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,

    /// Destination subject (outbound) or source subject (as received).
    #[serde(default)]
    pub subject: String,

    /// Subject the sender listens on for a reply; empty for publish-only.
    #[serde(default)]
    pub reply_to: String,

    /// Id of the envelope this one answers; empty for a fresh call.
    #[serde(default)]
    pub cause: String,

    /// Serialized application message. Only meaningful when the status is OK.
    #[serde(default, skip_serializing_if = "Bytes::is_empty")]
    pub payload: Bytes,

    /// Structured outcome; absent means OK.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Legacy plain-text failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    /// Queue group of the receiving subscription. Receive side only.
    #[serde(skip)]
    pub queue: Option<String>,
}

impl Envelope {
    // ---
    /// Wrap raw payload bytes into a fresh envelope.
    ///
    /// Assigns a new id and the current timestamp. Empty payloads are
    /// allowed (acknowledgements, error-only replies).
    pub fn wrap(payload: Bytes) -> Self {
        // ---
        Self {
            id: MessageId::generate().into_string(),
            timestamp: timestamp_nanos(),
            subject: String::new(),
            reply_to: String::new(),
            cause: String::new(),
            payload,
            status: None,
            error: String::new(),
            queue: None,
        }
    }

    /// Serialize `message` as JSON and wrap it into a fresh envelope.
    pub fn wrap_message<T>(message: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        // ---
        let bytes = serde_json::to_vec(message)?;
        Ok(Self::wrap(Bytes::from(bytes)))
    }

    /// Build the reply skeleton for an inbound envelope.
    ///
    /// The reply is addressed to the inbound `reply_to` and its `cause` is the
    /// inbound `id`.
    pub fn reply_for(inbound: &Envelope, payload: Bytes) -> Self {
        // ---
        let mut reply = Self::wrap(payload);
        reply.subject = inbound.reply_to.clone();
        reply.cause = inbound.id.clone();
        reply
    }

    /// Builder-style setter for `subject`.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Builder-style setter for `cause`; `None` leaves it empty.
    pub fn with_cause(mut self, cause: Option<&str>) -> Self {
        self.cause = cause.unwrap_or_default().to_string();
        self
    }

    /// Record a failure outcome and drop any payload.
    ///
    /// The message is mirrored into the legacy `error` field so that peers
    /// reading only that field still observe the failure.
    pub fn with_status(mut self, status: Status) -> Self {
        // ---
        if status.is_ok() {
            self.status = None;
            self.error.clear();
        } else {
            self.payload = Bytes::new();
            self.error = if status.message.is_empty() {
                status.code.to_string()
            } else {
                status.message.clone()
            };
            self.status = Some(status);
        }
        self
    }

    /// Effective outcome of this envelope.
    ///
    /// A structured status wins; otherwise a non-empty legacy `error` reads
    /// as [`Code::Unknown`]; otherwise the envelope is OK.
    pub fn effective_status(&self) -> Status {
        // ---
        match &self.status {
            Some(status) => status.clone(),
            None if !self.error.is_empty() => Status::new(Code::Unknown, self.error.clone()),
            None => Status::ok(),
        }
    }

    /// `true` when the sender expects a reply.
    pub fn expects_reply(&self) -> bool {
        !self.reply_to.is_empty()
    }

    /// Decode the JSON payload.
    ///
    /// An empty payload is read as JSON `null`, so `()` and `Option<T>`
    /// messages decode from payload-less envelopes.
    pub fn decode<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        // ---
        decode_payload(&self.payload)
    }

    /// Serialize the full envelope for transmission.
    pub fn encode(&self) -> Result<Bytes> {
        // ---
        let bytes = serde_json::to_vec(self)?;
        Ok(Bytes::from(bytes))
    }

    /// Decode wire bytes into an envelope, without delivery metadata.
    pub fn decode_bytes(data: &[u8]) -> Result<Self> {
        // ---
        let env: Envelope =
            serde_json::from_slice(data).map_err(|e| RpcError::Decode(e.to_string()))?;

        if env.id.is_empty() {
            return Err(RpcError::Decode("envelope has an empty id".into()));
        }
        Ok(env)
    }

    /// Decode a broker delivery into an envelope and attach its delivery
    /// metadata: the source subject, the broker's reply hint, and the queue
    /// group of the receiving subscription.
    ///
    /// `reply_to` always comes from the broker; a value written on the wire is
    /// discarded, so a message delivered without a reply hint expects none.
    pub fn unwrap(raw: &RawMessage) -> Result<Self> {
        // ---
        let mut env = Self::decode_bytes(&raw.data)?;
        env.subject = raw.subject.clone();
        env.reply_to = raw.reply.clone().unwrap_or_default();
        env.queue = raw.queue.clone();
        Ok(env)
    }
}

/// Decode a JSON payload, reading empty bytes as `null`.
pub(crate) fn decode_payload<T>(payload: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    // ---
    let bytes: &[u8] = if payload.is_empty() { b"null" } else { payload };
    serde_json::from_slice(bytes).map_err(|e| RpcError::Decode(e.to_string()))
}
