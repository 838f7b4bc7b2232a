//! Integration tests for `LedgerClient` against the in-process mock ledger.
//!
//! ## Test Categories
//!
//! - **Unary calls**: version, ledger end, command submission
//! - **Command defaulting**: command id, `actAs`, user id
//! - **Stream aggregation**: active contract set
//! - **Deadlines**: unary and aggregated calls
//! - **Credentials**: bearer metadata and rotation
//! - **Lifecycle**: service cache and `close()`

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use daml_ledger_proto::proto;
use daml_ledger_sdk::{
    ClientConfig, CompletionStreamOptions, GetActiveContractsOptions, LedgerClient, SdkError,
    SdkMetrics,
    mock::{DEFAULT_VERSION, MockLedgerServer},
    registry::schema,
    types::{Command, Commands, Identifier, Record, TransactionFilter, Value},
};
use futures::StreamExt;
use tonic::Code;

const STATE_SERVICE_PATH: &str = "com.daml.ledger.api.v2.StateService";

// ============================================================================
// Helpers
// ============================================================================

async fn setup() -> (MockLedgerServer, LedgerClient) {
    setup_with(|builder| builder).await
}

async fn setup_with(
    configure: impl FnOnce(daml_ledger_sdk::ClientConfigBuilder) -> daml_ledger_sdk::ClientConfigBuilder,
) -> (MockLedgerServer, LedgerClient) {
    let server = MockLedgerServer::start().await.unwrap();
    let builder = ClientConfig::builder()
        .with_endpoint(server.endpoint())
        .with_party("alice")
        .with_user_id("test-user");
    let client = LedgerClient::new(configure(builder).build().unwrap()).unwrap();
    (server, client)
}

fn create_asset() -> Commands {
    let template: Identifier = "pkg:Main:Asset".parse().unwrap();
    let args = Record::new().with_field("owner", Value::Party("alice".to_owned()));
    Commands::new(vec![Command::create(template, args)])
}

fn asset_template() -> proto::Identifier {
    proto::Identifier {
        package_id: "pkg".to_owned(),
        module_name: "Main".to_owned(),
        entity_name: "Asset".to_owned(),
    }
}

fn created(node_id: i32, contract_id: &str) -> proto::CreatedEvent {
    proto::CreatedEvent {
        node_id,
        contract_id: contract_id.to_owned(),
        template_id: Some(asset_template()),
        signatories: vec!["alice".to_owned()],
        ..Default::default()
    }
}

fn contract_chunk(contract_id: &str) -> proto::GetActiveContractsResponse {
    proto::GetActiveContractsResponse {
        workflow_id: String::new(),
        contract_entry: Some(proto::get_active_contracts_response::ContractEntry::ActiveContract(
            proto::ActiveContract {
                created_event: Some(created(0, contract_id)),
                synchronizer_id: "sync-1".to_owned(),
                reassignment_counter: 0,
            },
        )),
    }
}

#[derive(Debug, Default)]
struct CountingMetrics {
    requests: AtomicU64,
    failures: AtomicU64,
    chunks: AtomicU64,
}

impl SdkMetrics for CountingMetrics {
    fn record_request(&self, _method: &str, _duration: Duration, success: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_stream(&self, _method: &str, chunks: u64, _success: bool) {
        self.chunks.fetch_add(chunks, Ordering::Relaxed);
    }
}

// ============================================================================
// Unary Calls
// ============================================================================

#[tokio::test]
async fn test_get_version() {
    let (server, client) = setup().await;
    assert_eq!(client.get_version().await.unwrap(), DEFAULT_VERSION);

    server.set_version("3.4.0");
    assert_eq!(client.get_version().await.unwrap(), "3.4.0");
}

#[tokio::test]
async fn test_get_ledger_end() {
    let (server, client) = setup().await;
    assert_eq!(client.get_ledger_end().await.unwrap(), 0);

    server.set_ledger_end(42);
    assert_eq!(client.get_ledger_end().await.unwrap(), 42);
}

#[tokio::test]
async fn test_submit_and_wait_returns_update_and_offset() {
    let (server, client) = setup().await;
    server.set_submit_result("update-7", 17);

    let result = client.submit_and_wait(create_asset()).await.unwrap();
    assert_eq!(result.update_id, "update-7");
    assert_eq!(result.completion_offset, 17);
}

#[tokio::test]
async fn test_submission_rejection_is_normalized() {
    let (server, client) = setup().await;
    server.inject_failure(1, Code::AlreadyExists, "DUPLICATE_COMMAND");

    let err = client.submit_and_wait(create_asset()).await.unwrap_err();
    assert_eq!(err.code(), Some(Code::AlreadyExists));
    assert!(err.to_string().contains("DUPLICATE_COMMAND"));

    // The failure was consumed; the next submission goes through
    assert!(client.submit_and_wait(create_asset()).await.is_ok());
}

#[tokio::test]
async fn test_submit_and_wait_for_transaction() {
    let (_server, client) = setup().await;
    let commands = create_asset().with_command_id("cmd-tx").with_workflow_id("wf-1");

    let transaction = client.submit_and_wait_for_transaction(commands, None).await.unwrap();
    assert_eq!(transaction.command_id, "cmd-tx");
    assert_eq!(transaction.workflow_id, "wf-1");
    assert_eq!(transaction.update_id, "update-1");
}

#[tokio::test]
async fn test_submit_and_wait_for_transaction_tree() {
    let (server, client) = setup().await;
    server.set_submit_result("update-tree", 3);

    let tree = client
        .submit_and_wait_for_transaction_tree(create_asset().with_command_id("cmd-tree"))
        .await
        .unwrap();
    assert_eq!(tree.command_id, "cmd-tree");
    assert_eq!(tree.update_id, "update-tree");
    assert_eq!(tree.offset, 3);
    assert!(tree.walk_ids().is_empty());
}

#[tokio::test]
async fn test_transaction_tree_nesting_comes_from_node_ranges() {
    use proto::tree_event::Kind;

    let (server, client) = setup().await;
    let exercised = proto::ExercisedEvent {
        node_id: 0,
        last_descendant_node_id: 2,
        contract_id: "X".to_owned(),
        template_id: Some(asset_template()),
        choice: "Split".to_owned(),
        choice_argument: Some(proto::Value {
            sum: Some(proto::value::Sum::Record(proto::Record::default())),
        }),
        consuming: true,
        ..Default::default()
    };
    let events_by_id = [
        (0, Kind::Exercised(exercised)),
        (1, Kind::Created(created(1, "Y"))),
        (2, Kind::Created(created(2, "Z"))),
        (3, Kind::Created(created(3, "W"))),
    ]
    .into_iter()
    .map(|(id, kind)| (id, proto::TreeEvent { kind: Some(kind) }))
    .collect();
    server.set_transaction_tree(proto::TransactionTree {
        update_id: "update-split".to_owned(),
        offset: 8,
        events_by_id,
        ..Default::default()
    });

    let tree = client.submit_and_wait_for_transaction_tree(create_asset()).await.unwrap();
    assert_eq!(tree.root_event_ids, [0, 3]);
    assert_eq!(tree.events_by_id[&0].child_event_ids(), [1, 2]);
    assert_eq!(tree.walk_ids(), [0, 1, 2, 3]);
}

// ============================================================================
// Command Defaulting
// ============================================================================

#[tokio::test]
async fn test_missing_fields_are_filled_in() {
    let (server, client) = setup().await;
    client.submit_and_wait(create_asset()).await.unwrap();

    let recorded = server.requests_for("SubmitAndWait");
    let commands = recorded[0].commands.as_ref().unwrap();
    assert!(!commands.command_id.is_empty());
    assert_eq!(commands.act_as, ["alice"]);
    assert_eq!(commands.user_id, "test-user");
}

#[tokio::test]
async fn test_generated_command_ids_differ() {
    let (server, client) = setup().await;
    client.submit_and_wait(create_asset()).await.unwrap();
    client.submit_and_wait(create_asset()).await.unwrap();

    let ids: Vec<_> = server
        .requests_for("SubmitAndWait")
        .into_iter()
        .map(|r| r.commands.unwrap().command_id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_explicit_fields_are_sent_unchanged() {
    let (server, client) = setup().await;
    let commands = create_asset()
        .with_command_id("cmd-1")
        .with_act_as(["bob"])
        .with_read_as(["carol"]);
    client.submit_and_wait(commands).await.unwrap();

    let recorded = server.requests_for("SubmitAndWait");
    let commands = recorded[0].commands.as_ref().unwrap();
    assert_eq!(commands.command_id, "cmd-1");
    assert_eq!(commands.act_as, ["bob"]);
    assert_eq!(commands.read_as, ["carol"]);
    // Unset optional fields stay unset on the wire
    assert!(commands.workflow_id.is_empty());
    assert!(commands.deduplication_period.is_none());
}

#[tokio::test]
async fn test_submit_then_completion_stream() {
    let (_server, client) = setup().await;
    let command_id = client.submit(create_asset()).await.unwrap();

    let completions: Vec<_> = client
        .completion_stream(CompletionStreamOptions::new())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(completions.len(), 1);
    let completion = completions.into_iter().next().unwrap().unwrap();
    assert_eq!(completion.command_id, command_id);
    assert!(completion.is_successful());
}

#[tokio::test]
async fn test_completion_stream_resumes_after_offset() {
    let (server, client) = setup().await;
    server.set_submit_result("update-a", 4);
    client.submit(create_asset().with_command_id("first")).await.unwrap();
    server.set_submit_result("update-b", 6);
    client.submit(create_asset().with_command_id("second")).await.unwrap();

    let ids: Vec<_> = client
        .completion_stream(CompletionStreamOptions::new().with_begin_exclusive(4))
        .await
        .unwrap()
        .map(|completion| completion.unwrap().command_id)
        .collect()
        .await;
    assert_eq!(ids, ["second"]);
}

// ============================================================================
// Stream Aggregation
// ============================================================================

#[tokio::test]
async fn test_active_contracts_accumulate_in_order() {
    let (server, client) = setup().await;
    server.set_ledger_end(15);
    server.set_active_contracts(vec![contract_chunk("X"), contract_chunk("Y")]);

    let result = client
        .get_active_contracts(GetActiveContractsOptions::new(TransactionFilter::new()))
        .await
        .unwrap();
    let ids: Vec<_> = result.contracts.iter().map(|c| c.contract_id()).collect();
    assert_eq!(ids, ["X", "Y"]);
    assert_eq!(result.offset, 15);
    assert_eq!(server.requests_for("GetLedgerEnd").len(), 1);
}

#[tokio::test]
async fn test_active_contracts_at_requested_offset() {
    let (server, client) = setup().await;
    server.set_ledger_end(20);
    server.set_active_contracts(vec![contract_chunk("X")]);

    let options =
        GetActiveContractsOptions::new(TransactionFilter::wildcard_for(["alice"])).with_active_at_offset(12);
    let result = client.get_active_contracts(options).await.unwrap();
    assert_eq!(result.contracts.len(), 1);
    assert_eq!(result.offset, 12);
    assert!(server.requests_for("GetLedgerEnd").is_empty());
}

#[tokio::test]
async fn test_active_contracts_beyond_ledger_end_are_refused() {
    let (server, client) = setup().await;
    server.set_ledger_end(3);

    let options = GetActiveContractsOptions::new(TransactionFilter::new()).with_active_at_offset(9);
    let err = client.get_active_contracts(options).await.unwrap_err();
    assert_eq!(err.code(), Some(Code::FailedPrecondition));
}

#[tokio::test]
async fn test_active_contracts_error_discards_partial_result() {
    let (server, client) = setup().await;
    server.set_active_contracts(vec![contract_chunk("X"), contract_chunk("Y")]);
    server.fail_active_contracts_after(1, Code::Unavailable, "connection reset");

    let err = client
        .get_active_contracts(GetActiveContractsOptions::new(TransactionFilter::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::Unavailable));
}

#[tokio::test]
async fn test_active_contracts_metrics_count_chunks() {
    let metrics = Arc::new(CountingMetrics::default());
    let recorder = Arc::clone(&metrics);
    let (server, client) = setup_with(move |b| b.with_metrics(recorder)).await;
    server.set_active_contracts(vec![contract_chunk("X"), contract_chunk("Y")]);

    client
        .get_active_contracts(GetActiveContractsOptions::new(TransactionFilter::new()))
        .await
        .unwrap();
    assert_eq!(metrics.chunks.load(Ordering::Relaxed), 2);
}

// ============================================================================
// Deadlines
// ============================================================================

#[tokio::test]
async fn test_slow_call_fails_with_deadline_exceeded() {
    let (server, client) = setup_with(|b| b.with_timeout(Duration::from_millis(100))).await;
    server.inject_delay(1_000);

    let err = client.get_ledger_end().await.unwrap_err();
    assert!(err.is_deadline_exceeded(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_slow_stream_fails_with_deadline_exceeded() {
    let (server, client) = setup_with(|b| b.with_timeout(Duration::from_millis(200))).await;
    server.set_active_contracts(vec![contract_chunk("X"), contract_chunk("Y"), contract_chunk("Z")]);
    server.inject_chunk_delay(150);

    let err = client
        .get_active_contracts(GetActiveContractsOptions::new(TransactionFilter::new()))
        .await
        .unwrap_err();
    assert!(err.is_deadline_exceeded(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_deadline_travels_as_grpc_timeout() {
    let (server, client) = setup().await;
    client.get_version().await.unwrap();

    let recorded = server.requests_for("GetLedgerApiVersion");
    assert!(recorded[0].grpc_timeout.is_some());
}

#[tokio::test]
async fn test_failed_calls_are_counted() {
    let metrics = Arc::new(CountingMetrics::default());
    let recorder = Arc::clone(&metrics);
    let (server, client) = setup_with(move |b| b.with_metrics(recorder)).await;
    server.inject_failure(1, Code::PermissionDenied, "no rights");

    assert!(client.get_version().await.is_err());
    assert!(client.get_version().await.is_ok());
    assert_eq!(metrics.requests.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.failures.load(Ordering::Relaxed), 1);
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_bearer_token_is_attached_and_rotated() {
    let (server, client) = setup_with(|b| b.with_token("first")).await;

    client.get_version().await.unwrap();
    client.set_token("second").unwrap();
    client.get_version().await.unwrap();
    client.clear_token();
    client.get_version().await.unwrap();

    let sent: Vec<_> =
        server.requests_for("GetLedgerApiVersion").into_iter().map(|r| r.authorization).collect();
    assert_eq!(sent, [Some("Bearer first".to_owned()), Some("Bearer second".to_owned()), None]);
}

#[tokio::test]
async fn test_no_token_sends_no_authorization() {
    let (server, client) = setup().await;
    client.get_ledger_end().await.unwrap();
    assert_eq!(server.requests()[0].authorization, None);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_service_lookup_is_cached() {
    let (_server, client) = setup().await;
    let first = client.service(schema::STATE_SERVICE, STATE_SERVICE_PATH).unwrap();
    let second = client.service(schema::STATE_SERVICE, STATE_SERVICE_PATH).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other = client
        .service(schema::VERSION_SERVICE, "com.daml.ledger.api.v2.VersionService")
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
}

#[tokio::test]
async fn test_service_lookup_errors() {
    let (_server, client) = setup().await;
    assert!(matches!(
        client.service("missing.proto", STATE_SERVICE_PATH),
        Err(SdkError::SchemaNotFound { .. })
    ));
    match client.service(schema::STATE_SERVICE, "com.daml.ledger.api.v2.Nope") {
        Err(SdkError::ServiceNotFound { segment, .. }) => assert_eq!(segment, "Nope"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_close_rejects_later_calls() {
    let (server, client) = setup().await;
    client.get_version().await.unwrap();

    client.close();
    client.close();
    assert!(matches!(client.get_version().await, Err(SdkError::Shutdown)));
    assert!(matches!(
        client.service(schema::STATE_SERVICE, STATE_SERVICE_PATH),
        Err(SdkError::Shutdown)
    ));
    assert_eq!(server.requests_for("GetLedgerApiVersion").len(), 1);
}

#[tokio::test]
async fn test_close_abandons_in_flight_call() {
    let (server, client) = setup().await;
    server.inject_delay(2_000);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.get_ledger_end().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.close();

    let outcome = pending.await.unwrap();
    assert!(matches!(outcome, Err(SdkError::Shutdown)));
}
