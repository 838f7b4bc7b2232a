//! Protobuf types and conversions for the Daml Ledger API.
//!
//! This crate provides:
//! - Generated protobuf messages and gRPC service traits for
//!   `com.daml.ledger.api.v2` ([`proto`]) and the `google.rpc` error model
//!   ([`google::rpc`])
//! - The compiled descriptor set ([`FILE_DESCRIPTOR_SET`])
//! - Conversions between the data model in `daml-ledger-types` and the wire
//!   messages ([`convert`])
//!
//! # Architecture
//!
//! `build.rs` compiles the definitions vendored under `proto/` at the
//! workspace root. Clients do not use generated stubs: the SDK calls methods
//! by path through a descriptor-driven client. The server traits exist for
//! in-process test servers.

#![deny(unsafe_code)]
// gRPC services return tonic::Status (176 bytes) - standard practice for gRPC error handling
#![allow(clippy::result_large_err)]

/// Generated `com.daml.ledger.api.v2` package.
///
/// Modules mirror the protobuf package path so that generated cross-package
/// references (`google.rpc.Status`) resolve. Use the [`proto`] alias.
pub mod com {
    #![allow(missing_docs)]

    pub mod daml {
        pub mod ledger {
            pub mod api {
                pub mod v2 {
                    #![allow(clippy::all)]

                    tonic::include_proto!("com.daml.ledger.api.v2");
                }
            }
        }
    }
}

/// Generated `google.rpc` error model.
pub mod google {
    /// `google.rpc` messages carried in `grpc-status-details-bin`.
    pub mod rpc {
        #![allow(clippy::all)]
        #![allow(missing_docs)]

        tonic::include_proto!("google.rpc");
    }
}

/// Generated Ledger API v2 messages and service traits.
pub use com::daml::ledger::api::v2 as proto;

/// Encoded `FileDescriptorSet` for every compiled definition.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("ledger_api_v2_descriptor");

/// Bidirectional conversions between domain and protobuf types.
pub mod convert;
