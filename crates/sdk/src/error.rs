//! SDK error types.
//!
//! Provides one error enum for every failure a caller can observe:
//! - **Construction errors**: unknown schema file or service path, invalid
//!   configuration, transport setup
//! - **Service errors**: every gRPC failure normalized into [`SdkError::Rpc`],
//!   including deadline expiry
//! - **Representation errors**: model values rejected before any network call
//! - **Programming errors**: calling a method the service does not expose
//!
//! Nothing in this crate retries. Every failure reaches the caller once.

use std::collections::BTreeMap;

use daml_ledger_proto::google::rpc;
use daml_ledger_types::ModelError;
use prost::Message;
use snafu::{Location, Snafu};
use tonic::Code;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Type URL of `google.rpc.ErrorInfo` inside a status detail.
const ERROR_INFO_TYPE_URL: &str = "type.googleapis.com/google.rpc.ErrorInfo";

/// One machine-readable entry of a status detail list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Type URL of the packed detail message.
    pub type_url: String,
    /// Error reason, when the detail is a `google.rpc.ErrorInfo`.
    pub reason: Option<String>,
    /// Key/value context, when the detail is a `google.rpc.ErrorInfo`.
    pub metadata: BTreeMap<String, String>,
}

/// SDK error types with context-rich error messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SdkError {
    /// No schema file is registered under this path.
    #[snafu(display("Schema file not found: {file}"))]
    SchemaNotFound {
        /// Schema file path relative to the schema root.
        file: String,
    },

    /// A dotted service path did not resolve.
    #[snafu(display("Service '{path}' not found: no entry for segment '{segment}'"))]
    ServiceNotFound {
        /// The full dotted path that was requested.
        path: String,
        /// The first segment that did not resolve.
        segment: String,
    },

    /// The service client does not expose this method.
    #[snafu(display("Unknown method '{method}' on service '{service}'"))]
    UnknownMethod {
        /// Fully-qualified service name.
        service: String,
        /// The requested method name.
        method: String,
    },

    /// Transport-level error (HTTP/2, TLS).
    #[snafu(display("Transport error at {location}: {source}"))]
    Transport {
        /// Underlying transport error.
        source: tonic::transport::Error,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Normalized gRPC failure, including deadline expiry.
    #[snafu(display("RPC error (code={code:?}): {message}"))]
    Rpc {
        /// gRPC status code.
        code: Code,
        /// Error message from server.
        message: String,
        /// Decoded `google.rpc.Status` details, empty when none were sent.
        details: Vec<ErrorDetail>,
        /// ASCII response metadata attached to the failure.
        metadata: BTreeMap<String, String>,
    },

    /// A model value could not be encoded or a response could not be decoded.
    #[snafu(display("Model error: {source}"))]
    Model {
        /// The representation error.
        source: ModelError,
    },

    /// Configuration validation error.
    #[snafu(display("Configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },

    /// Client has been closed.
    #[snafu(display("Client shut down"))]
    Shutdown,

    /// URL parsing error.
    #[snafu(display("Invalid URL '{url}': {message}"))]
    InvalidUrl {
        /// The invalid URL.
        url: String,
        /// Parse error description.
        message: String,
    },
}

impl SdkError {
    /// Builds an RPC error with no details or metadata.
    #[must_use]
    pub fn rpc(code: Code, message: impl Into<String>) -> Self {
        Self::Rpc { code, message: message.into(), details: Vec::new(), metadata: BTreeMap::new() }
    }

    /// Returns the gRPC status code if this is an RPC error.
    #[must_use]
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the call ran out of time.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        self.code() == Some(Code::DeadlineExceeded)
    }

    /// Returns the decoded status details of an RPC error.
    #[must_use]
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            Self::Rpc { details, .. } => details,
            _ => &[],
        }
    }
}

impl From<tonic::transport::Error> for SdkError {
    fn from(source: tonic::transport::Error) -> Self {
        Self::Transport { source, location: Location::default() }
    }
}

impl From<ModelError> for SdkError {
    fn from(source: ModelError) -> Self {
        Self::Model { source }
    }
}

impl From<tonic::Status> for SdkError {
    fn from(status: tonic::Status) -> Self {
        let metadata = status
            .metadata()
            .iter()
            .filter_map(|entry| match entry {
                tonic::metadata::KeyAndValueRef::Ascii(key, value) => {
                    value.to_str().ok().map(|v| (key.as_str().to_owned(), v.to_owned()))
                },
                tonic::metadata::KeyAndValueRef::Binary(..) => None,
            })
            .collect();

        Self::Rpc {
            code: status.code(),
            message: status.message().to_owned(),
            details: decode_details(status.details()),
            metadata,
        }
    }
}

/// Decodes the `google.rpc.Status` packed in `grpc-status-details-bin`.
///
/// Undecodable bytes yield an empty list; the code and message still
/// describe the failure.
fn decode_details(bytes: &[u8]) -> Vec<ErrorDetail> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let Ok(status) = rpc::Status::decode(bytes) else {
        tracing::debug!(len = bytes.len(), "Undecodable grpc-status-details-bin");
        return Vec::new();
    };

    status
        .details
        .into_iter()
        .map(|any| {
            let info = (any.type_url == ERROR_INFO_TYPE_URL)
                .then(|| rpc::ErrorInfo::decode(any.value.as_slice()).ok())
                .flatten();
            match info {
                Some(info) => ErrorDetail {
                    type_url: any.type_url,
                    reason: Some(info.reason),
                    metadata: info.metadata.into_iter().collect(),
                },
                None => {
                    ErrorDetail { type_url: any.type_url, reason: None, metadata: BTreeMap::new() }
                },
            }
        })
        .collect()
}
