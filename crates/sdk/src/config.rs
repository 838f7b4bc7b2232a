//! Client configuration with builder pattern.
//!
//! Provides type-safe configuration for the ledger client including:
//! - The ledger endpoint and TLS material
//! - The bearer token and default identity (party, user id)
//! - Per-call and connect timeouts
//! - Schema root, compression and metrics

use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use snafu::ensure;

use crate::{
    error::{ConfigSnafu, InvalidUrlSnafu, Result},
    metrics::{SdkMetrics, default_metrics},
};

/// Default per-call timeout (30 000 ms).
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default directory schema files are resolved against.
const DEFAULT_SCHEMA_ROOT: &str = "protos";

/// Configuration for the ledger client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Normalized endpoint URL (e.g. `http://localhost:6865`).
    pub(crate) endpoint: String,

    /// TLS configuration; `None` means plaintext.
    pub(crate) tls: Option<TlsConfig>,

    /// Initial bearer token.
    pub(crate) token: Option<String>,

    /// Per-call timeout.
    pub(crate) timeout: Duration,

    /// Connection establishment timeout.
    pub(crate) connect_timeout: Duration,

    /// Default `act_as` party for submissions.
    pub(crate) party: Option<String>,

    /// Default user id for submissions.
    pub(crate) user_id: Option<String>,

    /// Directory schema files are resolved against.
    pub(crate) schema_root: PathBuf,

    /// Enable gzip compression for requests.
    pub(crate) compression: bool,

    /// Metrics sink.
    pub(crate) metrics: Arc<dyn SdkMetrics>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("tls", &self.tls)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("party", &self.party)
            .field("user_id", &self.user_id)
            .field("schema_root", &self.schema_root)
            .field("compression", &self.compression)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Returns the normalized endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the TLS configuration if enabled.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the default `act_as` party.
    #[must_use]
    pub fn party(&self) -> Option<&str> {
        self.party.as_deref()
    }

    /// Returns the default user id.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the schema root directory.
    #[must_use]
    pub fn schema_root(&self) -> &std::path::Path {
        &self.schema_root
    }

    /// Returns whether compression is enabled.
    #[must_use]
    pub fn compression(&self) -> bool {
        self.compression
    }

    /// Returns the metrics sink.
    #[must_use]
    pub fn metrics(&self) -> &Arc<dyn SdkMetrics> {
        &self.metrics
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    endpoint: Option<String>,
    tls: Option<TlsConfig>,
    token: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    party: Option<String>,
    user_id: Option<String>,
    schema_root: Option<PathBuf>,
    compression: bool,
    metrics: Option<Arc<dyn SdkMetrics>>,
}

impl ClientConfigBuilder {
    /// Sets the ledger endpoint.
    ///
    /// Accepts `host:port` or a full `http://`/`https://` URL. A bare
    /// `host:port` gets the scheme matching the TLS setting.
    #[must_use]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Enables or disables TLS.
    ///
    /// Enabling TLS without certificate material uses the system's native
    /// root certificates.
    #[must_use]
    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.tls = enabled.then(TlsConfig::default);
        self
    }

    /// Enables TLS with explicit certificate material.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use daml_ledger_sdk::{ClientConfig, TlsConfig};
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ClientConfig::builder()
    ///     .with_endpoint("ledger.example.com:443")
    ///     .with_tls_config(TlsConfig::new().with_ca_cert("/path/to/ca.pem"))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn with_tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the initial bearer token.
    #[must_use]
    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the per-call timeout.
    ///
    /// Default: 30 000 ms.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connection establishment timeout.
    ///
    /// Default: 5 seconds.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the party used as `act_as` when a submission names none.
    #[must_use]
    pub fn with_party<S: Into<String>>(mut self, party: S) -> Self {
        self.party = Some(party.into());
        self
    }

    /// Sets the user id used when a submission names none.
    #[must_use]
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the directory schema files are resolved against.
    ///
    /// Default: `protos`.
    #[must_use]
    pub fn with_schema_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.schema_root = Some(root.into());
        self
    }

    /// Enables gzip compression for requests.
    ///
    /// Default: disabled.
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Sets the metrics sink.
    ///
    /// Default: [`NoopSdkMetrics`](crate::NoopSdkMetrics).
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn SdkMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No endpoint provided
    /// - The endpoint is not `host:port` or an HTTP(S) URL
    /// - An `http://` URL is combined with TLS
    /// - Timeout or connect timeout is zero
    /// - TLS material is inconsistent
    pub fn build(self) -> Result<ClientConfig> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| ConfigSnafu { message: "endpoint is required" }.build())?;
        let endpoint = normalize_endpoint(&endpoint, self.tls.is_some())?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        ensure!(!timeout.is_zero(), ConfigSnafu { message: "timeout cannot be zero" });

        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        ensure!(
            !connect_timeout.is_zero(),
            ConfigSnafu { message: "connect_timeout cannot be zero" }
        );

        if let Some(ref tls) = self.tls {
            tls.validate()?;
        }

        Ok(ClientConfig {
            endpoint,
            tls: self.tls,
            token: self.token,
            timeout,
            connect_timeout,
            party: self.party,
            user_id: self.user_id,
            schema_root: self.schema_root.unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_ROOT)),
            compression: self.compression,
            metrics: self.metrics.unwrap_or_else(default_metrics),
        })
    }
}

/// Turns `host:port` or an HTTP(S) URL into a URL tonic accepts.
fn normalize_endpoint(endpoint: &str, tls: bool) -> Result<String> {
    let url = endpoint.trim();
    ensure!(
        !url.contains(char::is_whitespace),
        InvalidUrlSnafu { url, message: "URL cannot contain whitespace" }
    );

    let (url, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (url.to_owned(), rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        ensure!(!tls, InvalidUrlSnafu { url, message: "TLS requires an https:// URL" });
        (url.to_owned(), rest)
    } else if url.contains("://") {
        return InvalidUrlSnafu { url, message: "URL must use http:// or https://" }.fail();
    } else {
        let scheme = if tls { "https" } else { "http" };
        (format!("{scheme}://{url}"), url)
    };

    ensure!(!rest.is_empty(), InvalidUrlSnafu { url: endpoint, message: "URL must have a host" });
    Ok(url)
}

/// TLS configuration for secure connections.
///
/// Holds paths only. The files are read when the channel is built and the
/// bytes are handed to tonic unparsed. Without any material the system's
/// native root certificates verify the server.
///
/// # Example
///
/// ```no_run
/// # use daml_ledger_sdk::TlsConfig;
/// // Server verification against a private CA
/// let tls = TlsConfig::new().with_ca_cert("/path/to/ca.pem");
///
/// // Mutual TLS
/// let mtls = TlsConfig::new()
///     .with_ca_cert("/path/to/ca.pem")
///     .with_client_cert("/path/to/client.pem", "/path/to/client.key");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM CA certificate for server verification.
    ca_cert: Option<PathBuf>,

    /// PEM client certificate for mutual TLS.
    client_cert: Option<PathBuf>,

    /// PEM client private key for mutual TLS.
    client_key: Option<PathBuf>,

    /// Domain name to verify against the server certificate.
    /// If not set, the hostname from the endpoint URL is used.
    domain_name: Option<String>,
}

impl TlsConfig {
    /// Creates a TLS configuration that trusts the native roots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CA certificate file.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Sets the client certificate and key files for mutual TLS.
    #[must_use]
    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert_path.into());
        self.client_key = Some(key_path.into());
        self
    }

    /// Sets the domain name for server certificate verification.
    #[must_use]
    pub fn with_domain_name(mut self, domain: impl Into<String>) -> Self {
        self.domain_name = Some(domain.into());
        self
    }

    /// Returns the CA certificate path if configured.
    #[must_use]
    pub fn ca_cert(&self) -> Option<&std::path::Path> {
        self.ca_cert.as_deref()
    }

    /// Returns the client certificate path if configured.
    #[must_use]
    pub fn client_cert(&self) -> Option<&std::path::Path> {
        self.client_cert.as_deref()
    }

    /// Returns the client key path if configured.
    #[must_use]
    pub fn client_key(&self) -> Option<&std::path::Path> {
        self.client_key.as_deref()
    }

    /// Returns the domain name override if configured.
    #[must_use]
    pub fn domain_name(&self) -> Option<&str> {
        self.domain_name.as_deref()
    }

    /// Returns true when no CA is given and native roots verify the server.
    #[must_use]
    pub fn use_native_roots(&self) -> bool {
        self.ca_cert.is_none()
    }

    /// Validates the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if only one of client certificate and key is set.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.client_cert.is_some() == self.client_key.is_some(),
            ConfigSnafu { message: "client certificate and key must be set together" }
        );
        Ok(())
    }
}
