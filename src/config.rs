//! Public, broker-agnostic transport configuration.
//!
//! This type intentionally contains no broker-specific concepts (e.g. NATS
//! connect options). Broker adapters are responsible for interpreting this
//! config into concrete connection settings.

use std::time::Duration;

use crate::{Result, RpcError, DEFAULT_REQUEST_TIMEOUT};

/// Environment variable read by [`TransportConfig::from_env`] for the broker URI.
pub const ENV_BROKER_URI: &str = "BROKER_URI";

/// Environment variable read by [`TransportConfig::from_env`] for the default
/// request timeout, in milliseconds.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "RPC_REQUEST_TIMEOUT_MS";

/// Transport configuration and connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    // ---
    /// Broker connection URI (e.g. `"nats://localhost:4222"`).
    ///
    /// `None` selects the in-process memory broker.
    pub broker_uri: Option<String>,

    /// Name of this transport instance, used for logging.
    pub name: String,

    /// Default reply timeout seeded into [`Transport::request_options`](crate::Transport::request_options).
    ///
    /// Default: 2 seconds
    pub request_timeout: Duration,

    /// Optional broker type override (`"memory"`, `"nats"`).
    ///
    /// If `None`, the broker is chosen from the URI scheme.
    pub transport_type: Option<String>,
}

impl TransportConfig {
    /// Create a config for the given broker URI.
    pub fn with_broker(broker_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            broker_uri: Some(broker_uri.into()),
            name: name.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transport_type: None,
        }
    }

    /// Create a memory broker config (no external broker).
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            broker_uri: None,
            name: name.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transport_type: Some("memory".into()),
        }
    }

    /// Build a config from `BROKER_URI` and `RPC_REQUEST_TIMEOUT_MS`.
    ///
    /// A missing `BROKER_URI` selects the memory broker. A malformed timeout
    /// is a [`RpcError::ConfigConflict`].
    pub fn from_env(name: impl Into<String>) -> Result<Self> {
        Self::from_values(
            name,
            std::env::var(ENV_BROKER_URI).ok(),
            std::env::var(ENV_REQUEST_TIMEOUT_MS).ok(),
        )
    }

    fn from_values(
        name: impl Into<String>,
        broker_uri: Option<String>,
        timeout_ms: Option<String>,
    ) -> Result<Self> {
        // ---
        let mut config = match broker_uri {
            Some(uri) if !uri.is_empty() => Self::with_broker(uri, name),
            _ => Self::memory(name),
        };

        if let Some(raw) = timeout_ms {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                RpcError::ConfigConflict(format!("{ENV_REQUEST_TIMEOUT_MS}={raw:?} is not a number"))
            })?;
            config.request_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Set the default request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set an explicit broker type.
    pub fn with_transport_type(mut self, transport_type: impl Into<String>) -> Self {
        self.transport_type = Some(transport_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_memory_defaults() {
        // ---
        let config = TransportConfig::memory("svc");
        assert_eq!(config.broker_uri, None);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.transport_type.as_deref(), Some("memory"));
    }

    #[test]
    fn test_with_broker() {
        // ---
        let config = TransportConfig::with_broker("nats://localhost:4222", "cli")
            .with_request_timeout(Duration::from_millis(250));
        assert_eq!(config.broker_uri.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert!(config.transport_type.is_none());
    }

    #[test]
    fn test_with_transport_type_overrides_scheme() {
        // ---
        let config =
            TransportConfig::with_broker("nats://localhost:4222", "cli").with_transport_type("memory");
        assert_eq!(config.transport_type.as_deref(), Some("memory"));
        assert_eq!(config.broker_uri.as_deref(), Some("nats://localhost:4222"));
    }

    #[test]
    fn test_values_select_broker_and_timeout() {
        // ---
        let config = TransportConfig::from_values("svc", None, None).unwrap();
        assert_eq!(config, TransportConfig::memory("svc"));

        let config = TransportConfig::from_values("svc", Some(String::new()), None).unwrap();
        assert_eq!(config.transport_type.as_deref(), Some("memory"));

        let config =
            TransportConfig::from_values("svc", Some("nats://broker:4222".into()), Some(" 750 ".into()))
                .unwrap();
        assert_eq!(config.broker_uri.as_deref(), Some("nats://broker:4222"));
        assert!(config.transport_type.is_none());
        assert_eq!(config.request_timeout, Duration::from_millis(750));

        let err = TransportConfig::from_values("svc", None, Some("soon".into())).unwrap_err();
        assert!(matches!(err, RpcError::ConfigConflict(ref m) if m.contains(ENV_REQUEST_TIMEOUT_MS)));
    }

    // The only test in the crate that touches these variables.
    #[test]
    fn test_from_env() {
        // ---
        std::env::set_var(ENV_BROKER_URI, "nats://env-broker:4222");
        std::env::set_var(ENV_REQUEST_TIMEOUT_MS, "1500");
        let config = TransportConfig::from_env("svc");
        std::env::remove_var(ENV_BROKER_URI);
        std::env::remove_var(ENV_REQUEST_TIMEOUT_MS);

        let config = config.unwrap();
        assert_eq!(config.broker_uri.as_deref(), Some("nats://env-broker:4222"));
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
    }
}
