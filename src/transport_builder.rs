//! Transport builder.
//!
//! Provides a fluent builder API for constructing a [`Transport`] with clear
//! separation between required and optional configuration.

use std::time::Duration;

use crate::{BrokerPtr, Result, RpcError, Transport, TransportConfig, DEFAULT_REQUEST_TIMEOUT};

/// Builder for creating transport instances.
///
/// # Examples
///
/// ## In-process memory broker
/// ```
/// use subject_rpc::TransportBuilder;
///
/// # async fn example() -> subject_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .name("math-service")
///     .transport_type("memory")
///     .build()
///     .await?;
/// # transport.close().await?;
/// # Ok(())
/// # }
/// ```
///
/// ## NATS broker
/// ```no_run
/// use subject_rpc::TransportBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> subject_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("nats://localhost:4222")
///     .name("math-client")
///     .request_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TransportBuilder {
    uri: Option<String>,
    name: Option<String>,
    request_timeout: Option<Duration>,
    transport_type: Option<String>,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config.
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            uri: config.broker_uri.clone(),
            name: Some(config.name.clone()),
            request_timeout: Some(config.request_timeout),
            transport_type: config.transport_type.clone(),
        }
    }

    /// Set the broker URI.
    ///
    /// Examples:
    /// - `"nats://localhost:4222"`
    /// - `"memory://"`
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the transport name (required).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the default request timeout.
    ///
    /// Default: 2s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set explicit broker type.
    ///
    /// Valid values: `"memory"`, `"nats"`
    ///
    /// If not specified, a `nats://` URI selects NATS and anything else
    /// selects the memory broker.
    pub fn transport_type(mut self, flag: impl Into<String>) -> Self {
        self.transport_type = Some(flag.into());
        self
    }

    /// Resolve the builder into a [`TransportConfig`] without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::MissingConfig`] if `name` is not set.
    pub fn into_config(self) -> Result<TransportConfig> {
        // ---
        let name = self
            .name
            .ok_or_else(|| RpcError::MissingConfig("name".into()))?;

        Ok(TransportConfig {
            broker_uri: self.uri,
            name,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            transport_type: self.transport_type,
        })
    }

    /// Connect the broker and build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Required fields missing (`name`)
    /// - The broker type is unrecognized, or requires a URI that is missing
    /// - Broker connection fails
    pub async fn build(self) -> Result<Transport> {
        // ---
        let config = self.into_config()?;
        let broker = connect_broker(&config).await?;
        Ok(Transport::new(broker, config))
    }
}

/// Dispatch to the appropriate broker factory.
async fn connect_broker(config: &TransportConfig) -> Result<BrokerPtr> {
    // ---
    let by_scheme = match config.broker_uri.as_deref() {
        Some(uri) if uri.starts_with("nats://") || uri.starts_with("tls://") => "nats",
        _ => "memory",
    };

    match config.transport_type.as_deref().unwrap_or(by_scheme) {
        "memory" => crate::create_memory_broker(config).await,
        "nats" => {
            let uri = config
                .broker_uri
                .as_deref()
                .ok_or_else(|| RpcError::MissingConfig("uri (required for nats)".into()))?;
            crate::create_nats_broker(uri, config).await
        }
        other => Err(RpcError::ConfigConflict(format!(
            "unrecognized transport_type: {other}, valid values: memory, nats"
        ))),
    }
}
