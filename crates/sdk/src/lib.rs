//! Rust client for the Daml Ledger gRPC API.
//!
//! This SDK wraps the Ledger API v2 services behind a small async facade.
//! Domain values from [`daml_ledger_types`] are converted to wire messages,
//! sent over one shared channel, and the responses converted back.
//!
//! # Features
//!
//! - **Typed model**: values, commands, events and filters as Rust types
//! - **Cached service clients**: one client per schema service, resolved by
//!   dotted path and reused until [`LedgerClient::close`]
//! - **Per-call deadlines**: computed when each call starts
//! - **Stream aggregation**: the active contract set returned as one value
//! - **Bearer tokens**: attached to every call, rotatable at runtime
//!
//! # Quick Start
//!
//! ```no_run
//! use daml_ledger_sdk::{ClientConfig, LedgerClient};
//! use daml_ledger_sdk::types::{Command, Commands, Identifier, Record, Value};
//!
//! # async fn example() -> daml_ledger_sdk::Result<()> {
//! let config = ClientConfig::builder()
//!     .with_endpoint("localhost:6865")
//!     .with_party("Alice::1220")
//!     .with_user_id("my-app")
//!     .build()?;
//! let client = LedgerClient::new(config)?;
//!
//! let template: Identifier = "pkg:Main:Asset".parse()?;
//! let args = Record::new()
//!     .with_field("owner", Value::Party("Alice::1220".to_owned()))
//!     .with_field("name", Value::from("gold"));
//! let result = client.submit_and_wait(Commands::new(vec![Command::create(template, args)])).await?;
//! println!("committed {} at {}", result.update_id, result.completion_offset);
//!
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    LedgerClient (Public API)                │
//! │  .get_version() │ .submit_and_wait() │ .get_active_contracts()
//! ├─────────────────────────────────────────────────────────────┤
//! │          Wire conversion (daml_ledger_proto::convert)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 CallExecutor │ StreamAggregator             │
//! │   Per-call deadline │ Error normalization │ Aggregation     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      ServiceRegistry                        │
//! │   Schema catalog │ Dotted-path lookup │ Client cache        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                Connection Pool + Auth Interceptor           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::result_large_err)]

mod auth;
mod client;
mod config;
mod connection;
mod error;
mod executor;
mod metrics;
pub mod mock;
pub mod registry;
mod streaming;

// Public API exports
pub use auth::{AuthInterceptor, TokenStore};
pub use client::{
    CompletionStreamOptions, GetActiveContractsOptions, LedgerClient, SubmitAndWaitResult,
};
pub use config::{ClientConfig, ClientConfigBuilder, TlsConfig};
pub use connection::ConnectionPool;
pub use error::{ErrorDetail, Result, SdkError};
pub use executor::CallExecutor;
pub use metrics::{ChannelEvent, MetricsSdkMetrics, NoopSdkMetrics, SdkMetrics};
pub use registry::{
    MethodDescriptor, MethodKind, SchemaCatalog, ServiceClient, ServiceDescriptor, ServiceRegistry,
};
pub use streaming::{
    ActiveContracts, ActiveContractsAccumulator, ChunkAccumulator, Phase, StreamAggregator,
};

/// Domain model of the Ledger API.
pub use daml_ledger_types as types;
