//! Bearer-token propagation for outgoing calls.
//!
//! Every call carries `authorization: Bearer <token>` when a token is set.
//! The token lives in a [`TokenStore`] shared between the client and the
//! interceptor of every cached service client, so replacing it takes effect
//! on the next call without rebuilding anything.
//!
//! # Example
//!
//! ```no_run
//! use daml_ledger_sdk::{ClientConfig, LedgerClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder()
//!     .with_endpoint("localhost:6865")
//!     .with_token("initial-jwt")
//!     .build()?;
//! let client = LedgerClient::new(config)?;
//!
//! // Later, after refreshing the token
//! client.set_token("refreshed-jwt")?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tonic::{
    metadata::{AsciiMetadataValue, MetadataValue},
    service::Interceptor,
};

use crate::error::{ConfigSnafu, Result};

/// Metadata key carrying the credential.
pub(crate) const AUTHORIZATION: &str = "authorization";

/// Shared, replaceable bearer credential.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    header: Arc<RwLock<Option<AsciiMetadataValue>>>,
}

impl TokenStore {
    /// Creates a store holding `token`, if given.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token is not valid header text.
    pub fn new(token: Option<&str>) -> Result<Self> {
        let store = Self::default();
        if let Some(token) = token {
            store.set(token)?;
        }
        Ok(store)
    }

    /// Replaces the token wholesale.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token is not valid header text.
    pub fn set(&self, token: &str) -> Result<()> {
        let header = MetadataValue::try_from(format!("Bearer {token}")).map_err(|_| {
            ConfigSnafu { message: "token contains characters not allowed in metadata" }.build()
        })?;
        *self.header.write() = Some(header);
        Ok(())
    }

    /// Removes the token; later calls go out unauthenticated.
    pub fn clear(&self) {
        *self.header.write() = None;
    }

    /// Returns true if a token is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.header.read().is_some()
    }

    fn header(&self) -> Option<AsciiMetadataValue> {
        self.header.read().clone()
    }
}

/// Tonic interceptor that attaches the current bearer token.
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    tokens: TokenStore,
}

impl AuthInterceptor {
    /// Creates an interceptor reading from `tokens` on every call.
    #[must_use]
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> std::result::Result<tonic::Request<()>, tonic::Status> {
        if let Some(header) = self.tokens.header() {
            request.metadata_mut().insert(AUTHORIZATION, header);
        }
        Ok(request)
    }
}
