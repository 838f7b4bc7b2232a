//! Build script for daml-ledger-proto.
//!
//! Compiles the vendored Ledger API v2 and `google.rpc` definitions under
//! `../../proto` into Rust code using tonic-prost-build. `protoc` and the
//! `google/protobuf` well-known types come from protoc-bin-vendored unless
//! `PROTOC` points at a local install.

use std::path::{Path, PathBuf};

const PROTOS: &[&str] = &[
    "google/rpc/status.proto",
    "google/rpc/error_details.proto",
    "com/daml/ledger/api/v2/value.proto",
    "com/daml/ledger/api/v2/commands.proto",
    "com/daml/ledger/api/v2/event.proto",
    "com/daml/ledger/api/v2/transaction.proto",
    "com/daml/ledger/api/v2/transaction_filter.proto",
    "com/daml/ledger/api/v2/reassignment.proto",
    "com/daml/ledger/api/v2/completion.proto",
    "com/daml/ledger/api/v2/offset_checkpoint.proto",
    "com/daml/ledger/api/v2/trace_context.proto",
    "com/daml/ledger/api/v2/version_service.proto",
    "com/daml/ledger/api/v2/state_service.proto",
    "com/daml/ledger/api/v2/command_service.proto",
    "com/daml/ledger/api/v2/command_submission_service.proto",
    "com/daml/ledger/api/v2/command_completion_service.proto",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = Path::new("../../proto");
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    let mut config = prost_build::Config::new();
    if std::env::var_os("PROTOC").is_none() {
        config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);
    }

    let protos: Vec<PathBuf> = PROTOS.iter().map(|file| proto_root.join(file)).collect();
    let includes = [proto_root.to_path_buf(), protoc_bin_vendored::include_path()?];

    // Clients call methods by path through the SDK; only the server traits
    // are generated, for in-process test servers.
    tonic_prost_build::configure()
        .file_descriptor_set_path(out_dir.join("ledger_api_v2_descriptor.bin"))
        .build_server(true)
        .build_client(false)
        .emit_rerun_if_changed(true)
        .compile_with_config(config, &protos, &includes)?;

    Ok(())
}
