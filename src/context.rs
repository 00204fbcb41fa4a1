//! Per-call context handed to handlers.

use std::time::Instant;

use crate::Envelope;

/// Context for a single inbound message.
///
/// Built fresh by the dispatcher for every delivery and passed to the handler
/// by value, so nothing is shared between invocations. The inbound envelope
/// id doubles as the trace id; handlers that issue further calls can pass it
/// on as the `cause` of those calls.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Trace identifier for this call (the inbound envelope id).
    pub trace_id: String,

    /// Subject the message arrived on.
    pub subject: String,

    /// Reply subject, `None` for publish-only messages.
    pub reply_to: Option<String>,

    /// Id of the envelope that caused this one, if any.
    pub cause: Option<String>,

    /// Queue group of the receiving subscription.
    pub queue: Option<String>,

    /// When the dispatcher picked up the message.
    pub received_at: Instant,
}

impl CallContext {
    pub(crate) fn for_envelope(env: &Envelope) -> Self {
        // ---
        Self {
            trace_id: env.id.clone(),
            subject: env.subject.clone(),
            reply_to: non_empty(&env.reply_to),
            cause: non_empty(&env.cause),
            queue: env.queue.clone(),
            received_at: Instant::now(),
        }
    }

    /// `true` when the caller is waiting for a reply.
    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
