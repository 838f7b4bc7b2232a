//! Connection pool and channel management.
//!
//! The [`ConnectionPool`] owns the single tonic [`Channel`] shared by every
//! service client:
//! - **Lazy connection**: the channel is built with `connect_lazy`, so the
//!   TCP/TLS handshake happens on the first call rather than at construction
//! - **Shared ownership**: the channel is cached in `Arc<RwLock<...>>` and
//!   cloned out to callers (clones share the HTTP/2 connection)
//! - **TLS**: certificate files named in [`TlsConfig`] are read here and
//!   handed to tonic unparsed
//!
//! Per-call deadlines are applied by the executor, not the endpoint, so
//! long-lived streams are not cut off by the unary timeout.

use std::{path::Path, sync::Arc, time::Duration};

use parking_lot::RwLock;
use snafu::ResultExt;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

use crate::{
    config::{ClientConfig, TlsConfig},
    error::{ConfigSnafu, InvalidUrlSnafu, Result, TransportSnafu},
    metrics::ChannelEvent,
};

/// HTTP/2 keep-alive interval for idle connections.
const HTTP2_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP/2 keep-alive timeout.
const HTTP2_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP keepalive interval.
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Connection pool managing the tonic gRPC channel.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    /// Cached channel, lazily initialized.
    channel: Arc<RwLock<Option<Channel>>>,

    /// Client configuration for connection settings.
    config: ClientConfig,
}

impl ConnectionPool {
    /// Creates a new connection pool with the given configuration.
    ///
    /// No channel is built until [`channel`](Self::channel) is first called.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self { channel: Arc::new(RwLock::new(None)), config }
    }

    /// Returns the shared channel, building it on first use.
    ///
    /// Must be called within a Tokio runtime: the lazy channel spawns its
    /// connection worker on creation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint URL is rejected by tonic
    /// - A TLS certificate file cannot be read
    /// - The TLS configuration is rejected by tonic
    pub fn channel(&self) -> Result<Channel> {
        {
            let guard = self.channel.read();
            if let Some(channel) = guard.as_ref() {
                return Ok(channel.clone());
            }
        }

        let mut guard = self.channel.write();
        // Double-check pattern: another task might have built it while we waited
        if let Some(channel) = guard.as_ref() {
            return Ok(channel.clone());
        }
        let channel = self.create_channel()?;
        *guard = Some(channel.clone());
        self.config.metrics.record_channel(&self.config.endpoint, ChannelEvent::Created);
        tracing::debug!(endpoint = %self.config.endpoint, "Created lazy channel");
        Ok(channel)
    }

    /// Creates a new channel with all configured settings applied.
    fn create_channel(&self) -> Result<Channel> {
        let url = self.config.endpoint.clone();
        let endpoint = Endpoint::from_shared(url.clone()).map_err(|_| {
            InvalidUrlSnafu { url, message: "Failed to parse as tonic endpoint" }.build()
        })?;

        let mut endpoint = self.configure_endpoint(endpoint);
        if let Some(tls) = self.config.tls() {
            endpoint = endpoint.tls_config(client_tls_config(tls)?).context(TransportSnafu)?;
        }

        Ok(endpoint.connect_lazy())
    }

    /// Applies configuration settings to an endpoint.
    ///
    /// Compression is configured per call, not on the endpoint.
    fn configure_endpoint(&self, endpoint: Endpoint) -> Endpoint {
        endpoint
            .connect_timeout(self.config.connect_timeout)
            .tcp_nodelay(true)
            .tcp_keepalive(Some(TCP_KEEPALIVE_INTERVAL))
            .http2_keep_alive_interval(HTTP2_KEEPALIVE_INTERVAL)
            .keep_alive_timeout(HTTP2_KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true)
    }

    /// Returns whether compression is enabled for this connection.
    #[must_use]
    pub fn compression_enabled(&self) -> bool {
        self.config.compression
    }

    /// Returns a reference to the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns true if a channel is currently cached.
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.channel.read().is_some()
    }

    /// Drops the cached channel. Returns true if one was cached.
    ///
    /// In-flight calls keep their own clone and finish normally.
    pub fn reset(&self) -> bool {
        let released = self.channel.write().take().is_some();
        if released {
            self.config.metrics.record_channel(&self.config.endpoint, ChannelEvent::Released);
        }
        released
    }
}

/// Builds tonic's TLS settings from file paths.
fn client_tls_config(tls: &TlsConfig) -> Result<ClientTlsConfig> {
    let mut config = ClientTlsConfig::new();
    config = match tls.ca_cert() {
        Some(path) => config.ca_certificate(Certificate::from_pem(read_material(path)?)),
        None => config.with_native_roots(),
    };
    if let (Some(cert), Some(key)) = (tls.client_cert(), tls.client_key()) {
        config = config.identity(Identity::from_pem(read_material(cert)?, read_material(key)?));
    }
    if let Some(domain) = tls.domain_name() {
        config = config.domain_name(domain);
    }
    Ok(config)
}

fn read_material(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ConfigSnafu { message: format!("cannot read TLS file {}: {e}", path.display()) }.build()
    })
}
