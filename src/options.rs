//! Per-call options.
//!
//! Each operation takes a single options value constructed by the caller.
//! Options are plain data: they are never persisted and never shared between
//! calls. All fields are public; the `with_*` setters exist for chaining.

use std::time::Duration;

use crate::RetryConfig;

/// Request timeout used when neither the call nor the transport config
/// specifies one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Options for [`Transport::publish`](crate::Transport::publish).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    /// Id of the envelope this notification traces back to.
    pub cause: Option<String>,
}

impl PublishOptions {
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Options for [`Transport::request`](crate::Transport::request).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Id of the envelope that caused this call.
    pub cause: Option<String>,

    /// How long to wait for the reply.
    ///
    /// Default: [`DEFAULT_REQUEST_TIMEOUT`]. With retry enabled this applies
    /// to each attempt independently.
    pub timeout: Duration,

    /// Retry transport failures. Default: `None` (single attempt).
    pub retry: Option<RetryConfig>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cause: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: None,
        }
    }
}

impl RequestOptions {
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Options for [`Transport::subscribe`](crate::Transport::subscribe).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeOptions {
    /// Competing-consumer group. Among subscribers sharing a subject and a
    /// group, each message is delivered to exactly one. `None` subscribes for
    /// broadcast delivery.
    pub queue_group: Option<String>,
}

impl SubscribeOptions {
    pub fn with_queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }
}
