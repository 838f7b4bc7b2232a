//! Mock gRPC server for SDK integration testing.
//!
//! This module provides a controllable in-process implementation of the
//! Ledger API services the SDK calls, for testing without a running ledger.
//!
//! # Features
//!
//! - **Canned responses**: version, ledger end, submission results,
//!   transactions and the active contract set are set by the test
//! - **Request recording**: every call is recorded with its `authorization`
//!   and `grpc-timeout` metadata and the submitted commands
//! - **Failure injection**: fail the next N calls with a status, or fail the
//!   active-contract stream after N chunks
//! - **Delay injection**: delay every call, or every streamed chunk
//!
//! # Example
//!
//! ```no_run
//! use daml_ledger_sdk::mock::MockLedgerServer;
//! use daml_ledger_sdk::{ClientConfig, LedgerClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockLedgerServer::start().await?;
//! server.set_ledger_end(42);
//!
//! let config = ClientConfig::builder().with_endpoint(server.endpoint()).build()?;
//! let client = LedgerClient::new(config)?;
//! assert_eq!(client.get_ledger_end().await?, 42);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::VecDeque,
    net::SocketAddr,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

use daml_ledger_proto::{
    google::rpc,
    proto::{
        self,
        command_completion_service_server::{
            CommandCompletionService, CommandCompletionServiceServer,
        },
        command_service_server::{CommandService, CommandServiceServer},
        command_submission_service_server::{
            CommandSubmissionService, CommandSubmissionServiceServer,
        },
        state_service_server::{StateService, StateServiceServer},
        version_service_server::{VersionService, VersionServiceServer},
    },
};
use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tonic::{Code, Request, Response, Status, transport::Server};

use crate::{auth::AUTHORIZATION, error::SdkError};

/// Ledger API version reported by default.
pub const DEFAULT_VERSION: &str = "3.3.0";

/// Boxed response stream of the mock services.
type MockStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// A call received by the mock server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// gRPC method name (e.g. `SubmitAndWait`).
    pub method: &'static str,
    /// `authorization` metadata as received.
    pub authorization: Option<String>,
    /// `grpc-timeout` metadata as received.
    pub grpc_timeout: Option<String>,
    /// Submitted commands, for command service calls.
    pub commands: Option<proto::Commands>,
}

/// A scripted failure.
#[derive(Debug, Clone)]
struct InjectedFailure {
    code: Code,
    message: String,
}

impl InjectedFailure {
    fn status(&self) -> Status {
        Status::new(self.code, self.message.clone())
    }
}

/// Shared state for the mock server.
#[derive(Debug, Default)]
struct MockState {
    version: RwLock<String>,

    ledger_end: AtomicI64,

    /// Canned `SubmitAndWait` result: (update id, completion offset).
    submit_result: RwLock<(String, i64)>,

    /// Canned transaction; built from the request when unset.
    transaction: RwLock<Option<proto::Transaction>>,

    /// Canned transaction tree; built from the request when unset.
    transaction_tree: RwLock<Option<proto::TransactionTree>>,

    /// Chunks of the active contract stream, in order.
    active_contracts: RwLock<Vec<proto::GetActiveContractsResponse>>,

    /// Fail the active contract stream after this many chunks.
    active_contracts_failure: RwLock<Option<(usize, InjectedFailure)>>,

    /// Completions served by the completion stream.
    completions: RwLock<Vec<proto::Completion>>,

    /// Failures for the next calls, consumed one per call.
    failures: RwLock<VecDeque<InjectedFailure>>,

    /// Delay to inject for each request (milliseconds).
    delay_ms: AtomicU64,

    /// Delay to inject before each streamed chunk (milliseconds).
    chunk_delay_ms: AtomicU64,

    requests: RwLock<Vec<RecordedRequest>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            version: RwLock::new(DEFAULT_VERSION.to_owned()),
            submit_result: RwLock::new(("update-1".to_owned(), 1)),
            ..Default::default()
        }
    }

    fn record<T>(&self, method: &'static str, request: &Request<T>, commands: Option<&proto::Commands>) {
        let metadata = request.metadata();
        let text = |key: &str| metadata.get(key).and_then(|v| v.to_str().ok()).map(str::to_owned);
        self.requests.write().push(RecordedRequest {
            method,
            authorization: text(AUTHORIZATION),
            grpc_timeout: text("grpc-timeout"),
            commands: commands.cloned(),
        });
    }

    /// Applies configured delay and checks for injected errors.
    async fn check_injection(&self) -> Result<(), Status> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        match self.failures.write().pop_front() {
            Some(failure) => Err(failure.status()),
            None => Ok(()),
        }
    }

    fn chunked<T: Send + 'static>(&self, items: Vec<Result<T, Status>>) -> MockStream<T> {
        let delay = Duration::from_millis(self.chunk_delay_ms.load(Ordering::SeqCst));
        if delay.is_zero() {
            return Box::pin(futures::stream::iter(items));
        }
        Box::pin(futures::stream::iter(items).then(move |item| async move {
            tokio::time::sleep(delay).await;
            item
        }))
    }
}

/// Mock implementation of the Ledger API services.
///
/// Dropping the handle stops the server.
pub struct MockLedgerServer {
    state: Arc<MockState>,
    endpoint: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockLedgerServer {
    /// Starts a new mock server on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::Config` if binding to an ephemeral port fails.
    pub async fn start() -> crate::Result<Self> {
        Self::start_on_port(0).await
    }

    /// Starts a new mock server on a specific port.
    ///
    /// Use port 0 to let the OS assign an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::Config` if binding to the port fails.
    pub async fn start_on_port(port: u16) -> crate::Result<Self> {
        let state = Arc::new(MockState::new());

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let bind_error = |e: std::io::Error| SdkError::Config { message: format!("Failed to bind: {e}") };
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let endpoint = format!("http://{local_addr}");
        let service = MockLedgerService { state: Arc::clone(&state) };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
        tokio::spawn(async move {
            let result = Server::builder()
                .add_service(VersionServiceServer::new(service.clone()))
                .add_service(CommandServiceServer::new(service.clone()))
                .add_service(CommandSubmissionServiceServer::new(service.clone()))
                .add_service(CommandCompletionServiceServer::new(service.clone()))
                .add_service(StateServiceServer::new(service))
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!("Mock server error: {}", e);
            }
        });

        Ok(Self { state, endpoint, shutdown_tx: Some(shutdown_tx) })
    }

    /// Returns the endpoint URL for connecting to this server.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sets the reported Ledger API version.
    pub fn set_version(&self, version: &str) {
        *self.state.version.write() = version.to_owned();
    }

    /// Sets the reported ledger end.
    pub fn set_ledger_end(&self, offset: i64) {
        self.state.ledger_end.store(offset, Ordering::SeqCst);
    }

    /// Sets the update id and completion offset of successful submissions.
    pub fn set_submit_result(&self, update_id: &str, completion_offset: i64) {
        *self.state.submit_result.write() = (update_id.to_owned(), completion_offset);
    }

    /// Sets the transaction returned by `SubmitAndWaitForTransaction`.
    pub fn set_transaction(&self, transaction: proto::Transaction) {
        *self.state.transaction.write() = Some(transaction);
    }

    /// Sets the tree returned by `SubmitAndWaitForTransactionTree`.
    pub fn set_transaction_tree(&self, tree: proto::TransactionTree) {
        *self.state.transaction_tree.write() = Some(tree);
    }

    /// Sets the chunks of the active contract stream.
    pub fn set_active_contracts(&self, chunks: Vec<proto::GetActiveContractsResponse>) {
        *self.state.active_contracts.write() = chunks;
    }

    /// Makes the active contract stream fail after `chunks` chunks.
    pub fn fail_active_contracts_after(&self, chunks: usize, code: Code, message: &str) {
        *self.state.active_contracts_failure.write() =
            Some((chunks, InjectedFailure { code, message: message.to_owned() }));
    }

    /// Adds a completion served by the completion stream.
    pub fn push_completion(&self, completion: proto::Completion) {
        self.state.completions.write().push(completion);
    }

    /// Fails the next `count` calls with `code`.
    pub fn inject_failure(&self, count: usize, code: Code, message: &str) {
        let mut failures = self.state.failures.write();
        for _ in 0..count {
            failures.push_back(InjectedFailure { code, message: message.to_owned() });
        }
    }

    /// Injects a delay for all subsequent requests.
    ///
    /// Sets to 0 to disable delay.
    pub fn inject_delay(&self, millis: u64) {
        self.state.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Injects a delay before every streamed chunk.
    pub fn inject_chunk_delay(&self, millis: u64) {
        self.state.chunk_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Returns every call received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.read().clone()
    }

    /// Returns the calls received for `method`.
    #[must_use]
    pub fn requests_for(&self, method: &str) -> Vec<RecordedRequest> {
        self.state.requests.read().iter().filter(|r| r.method == method).cloned().collect()
    }

    /// Returns the total number of calls received.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.requests.read().len()
    }

    /// Resets recorded requests and injected failures.
    pub fn reset(&self) {
        self.state.requests.write().clear();
        self.state.failures.write().clear();
        *self.state.active_contracts_failure.write() = None;
        self.state.delay_ms.store(0, Ordering::SeqCst);
        self.state.chunk_delay_ms.store(0, Ordering::SeqCst);
    }

    /// Shuts down the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockLedgerServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Shared handler behind every mock service.
#[derive(Clone)]
struct MockLedgerService {
    state: Arc<MockState>,
}

impl MockLedgerService {
    fn completion_for(&self, commands: &proto::Commands) -> proto::Completion {
        let (update_id, offset) = self.state.submit_result.read().clone();
        proto::Completion {
            command_id: commands.command_id.clone(),
            status: Some(rpc::Status { code: 0, message: String::new(), details: Vec::new() }),
            update_id,
            user_id: commands.user_id.clone(),
            act_as: commands.act_as.clone(),
            submission_id: commands.submission_id.clone(),
            offset,
            synchronizer_time: Some(proto::SynchronizerTime {
                synchronizer_id: commands.synchronizer_id.clone(),
                record_time: None,
            }),
            ..Default::default()
        }
    }
}

fn completion_response(
    response: proto::completion_stream_response::CompletionResponse,
) -> proto::CompletionStreamResponse {
    proto::CompletionStreamResponse { completion_response: Some(response) }
}

fn required_commands(commands: Option<proto::Commands>) -> Result<proto::Commands, Status> {
    commands.ok_or_else(|| Status::invalid_argument("missing commands"))
}

// =============================================================================
// Mock VersionService Implementation
// =============================================================================

#[tonic::async_trait]
impl VersionService for MockLedgerService {
    async fn get_ledger_api_version(
        &self,
        request: Request<proto::GetLedgerApiVersionRequest>,
    ) -> Result<Response<proto::GetLedgerApiVersionResponse>, Status> {
        self.state.record("GetLedgerApiVersion", &request, None);
        self.state.check_injection().await?;

        Ok(Response::new(proto::GetLedgerApiVersionResponse {
            version: self.state.version.read().clone(),
        }))
    }
}

// =============================================================================
// Mock CommandService Implementation
// =============================================================================

#[tonic::async_trait]
impl CommandService for MockLedgerService {
    async fn submit_and_wait(
        &self,
        request: Request<proto::SubmitAndWaitRequest>,
    ) -> Result<Response<proto::SubmitAndWaitResponse>, Status> {
        self.state.record("SubmitAndWait", &request, request.get_ref().commands.as_ref());
        self.state.check_injection().await?;
        let commands = required_commands(request.into_inner().commands)?;

        let completion = self.completion_for(&commands);
        self.state.completions.write().push(completion);
        let (update_id, offset) = self.state.submit_result.read().clone();
        Ok(Response::new(proto::SubmitAndWaitResponse { update_id, completion_offset: offset }))
    }

    async fn submit_and_wait_for_transaction(
        &self,
        request: Request<proto::SubmitAndWaitForTransactionRequest>,
    ) -> Result<Response<proto::SubmitAndWaitForTransactionResponse>, Status> {
        self.state.record(
            "SubmitAndWaitForTransaction",
            &request,
            request.get_ref().commands.as_ref(),
        );
        self.state.check_injection().await?;
        let commands = required_commands(request.into_inner().commands)?;

        let transaction = self.state.transaction.read().clone().unwrap_or_else(|| {
            let (update_id, offset) = self.state.submit_result.read().clone();
            proto::Transaction {
                update_id,
                command_id: commands.command_id.clone(),
                workflow_id: commands.workflow_id.clone(),
                offset,
                ..Default::default()
            }
        });
        Ok(Response::new(proto::SubmitAndWaitForTransactionResponse {
            transaction: Some(transaction),
        }))
    }

    async fn submit_and_wait_for_transaction_tree(
        &self,
        request: Request<proto::SubmitAndWaitRequest>,
    ) -> Result<Response<proto::SubmitAndWaitForTransactionTreeResponse>, Status> {
        self.state.record(
            "SubmitAndWaitForTransactionTree",
            &request,
            request.get_ref().commands.as_ref(),
        );
        self.state.check_injection().await?;
        let commands = required_commands(request.into_inner().commands)?;

        let tree = self.state.transaction_tree.read().clone().unwrap_or_else(|| {
            let (update_id, offset) = self.state.submit_result.read().clone();
            proto::TransactionTree {
                update_id,
                command_id: commands.command_id.clone(),
                workflow_id: commands.workflow_id.clone(),
                offset,
                ..Default::default()
            }
        });
        Ok(Response::new(proto::SubmitAndWaitForTransactionTreeResponse { transaction: Some(tree) }))
    }
}

// =============================================================================
// Mock CommandSubmissionService Implementation
// =============================================================================

#[tonic::async_trait]
impl CommandSubmissionService for MockLedgerService {
    async fn submit(
        &self,
        request: Request<proto::SubmitRequest>,
    ) -> Result<Response<proto::SubmitResponse>, Status> {
        self.state.record("Submit", &request, request.get_ref().commands.as_ref());
        self.state.check_injection().await?;
        let commands = required_commands(request.into_inner().commands)?;

        let completion = self.completion_for(&commands);
        self.state.completions.write().push(completion);
        Ok(Response::new(proto::SubmitResponse {}))
    }
}

// =============================================================================
// Mock CommandCompletionService Implementation
// =============================================================================

#[tonic::async_trait]
impl CommandCompletionService for MockLedgerService {
    type CompletionStreamStream = MockStream<proto::CompletionStreamResponse>;

    async fn completion_stream(
        &self,
        request: Request<proto::CompletionStreamRequest>,
    ) -> Result<Response<Self::CompletionStreamStream>, Status> {
        use proto::completion_stream_response::CompletionResponse;

        self.state.record("CompletionStream", &request, None);
        self.state.check_injection().await?;
        let request = request.into_inner();
        if request.begin_exclusive < 0 {
            return Err(Status::invalid_argument("negative begin_exclusive"));
        }

        let mut items: Vec<_> = self
            .state
            .completions
            .read()
            .iter()
            .filter(|c| c.offset > request.begin_exclusive)
            .filter(|c| request.parties.is_empty() || c.act_as.iter().any(|p| request.parties.contains(p)))
            .map(|c| Ok(completion_response(CompletionResponse::Completion(c.clone()))))
            .collect();
        // Close with a checkpoint at the ledger end, as a participant does between bursts.
        items.push(Ok(completion_response(CompletionResponse::OffsetCheckpoint(
            proto::OffsetCheckpoint {
                offset: self.state.ledger_end.load(Ordering::SeqCst),
                synchronizer_times: Vec::new(),
            },
        ))));
        Ok(Response::new(self.state.chunked(items)))
    }
}

// =============================================================================
// Mock StateService Implementation
// =============================================================================

#[tonic::async_trait]
impl StateService for MockLedgerService {
    type GetActiveContractsStream = MockStream<proto::GetActiveContractsResponse>;

    async fn get_active_contracts(
        &self,
        request: Request<proto::GetActiveContractsRequest>,
    ) -> Result<Response<Self::GetActiveContractsStream>, Status> {
        self.state.record("GetActiveContracts", &request, None);
        self.state.check_injection().await?;
        let request = request.into_inner();
        if request.event_format.is_none() && request.filter.is_none() {
            return Err(Status::invalid_argument("missing event_format"));
        }
        let ledger_end = self.state.ledger_end.load(Ordering::SeqCst);
        if request.active_at_offset < 0 || request.active_at_offset > ledger_end {
            return Err(Status::failed_precondition(format!(
                "active_at_offset {} is outside [0, {ledger_end}]",
                request.active_at_offset
            )));
        }

        let chunks = self.state.active_contracts.read().clone();
        let failure = self.state.active_contracts_failure.read().clone();
        let mut items: Vec<_> = match &failure {
            Some((after, _)) => chunks.into_iter().take(*after).map(Ok).collect(),
            None => chunks.into_iter().map(Ok).collect(),
        };
        if let Some((_, failure)) = failure {
            items.push(Err(failure.status()));
        }
        Ok(Response::new(self.state.chunked(items)))
    }

    async fn get_ledger_end(
        &self,
        request: Request<proto::GetLedgerEndRequest>,
    ) -> Result<Response<proto::GetLedgerEndResponse>, Status> {
        self.state.record("GetLedgerEnd", &request, None);
        self.state.check_injection().await?;

        Ok(Response::new(proto::GetLedgerEndResponse {
            offset: self.state.ledger_end.load(Ordering::SeqCst),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts_on_ephemeral_port() {
        let server = MockLedgerServer::start().await.unwrap();
        assert!(server.endpoint().starts_with("http://127.0.0.1:"));
        assert!(!server.endpoint().ends_with(":0"));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let server = MockLedgerServer::start().await.unwrap();
        server.inject_failure(2, Code::Unavailable, "down");

        assert_eq!(server.state.check_injection().await.unwrap_err().code(), Code::Unavailable);
        assert!(server.state.check_injection().await.is_err());
        assert!(server.state.check_injection().await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_clears_recorded_requests() {
        let server = MockLedgerServer::start().await.unwrap();
        let request = Request::new(proto::GetLedgerEndRequest {});
        server.state.record("GetLedgerEnd", &request, None);
        assert_eq!(server.request_count(), 1);
        assert_eq!(server.requests_for("GetLedgerEnd").len(), 1);

        server.reset();
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_echoes_commands() {
        let server = MockLedgerServer::start().await.unwrap();
        server.set_submit_result("tx-9", 9);
        let service = MockLedgerService { state: Arc::clone(&server.state) };
        let commands = proto::Commands {
            command_id: "cmd-1".to_owned(),
            act_as: vec!["alice".to_owned()],
            synchronizer_id: "sync-1".to_owned(),
            ..Default::default()
        };

        let completion = service.completion_for(&commands);
        assert_eq!(completion.command_id, "cmd-1");
        assert_eq!(completion.update_id, "tx-9");
        assert_eq!(completion.offset, 9);
        assert_eq!(completion.act_as, ["alice"]);
        assert_eq!(completion.synchronizer_time.unwrap().synchronizer_id, "sync-1");
    }

    #[tokio::test]
    async fn test_snapshot_beyond_ledger_end_is_refused() {
        let server = MockLedgerServer::start().await.unwrap();
        server.set_ledger_end(5);
        let service = MockLedgerService { state: Arc::clone(&server.state) };
        let request = |offset| {
            Request::new(proto::GetActiveContractsRequest {
                active_at_offset: offset,
                event_format: Some(proto::EventFormat::default()),
                ..Default::default()
            })
        };

        let status = service.get_active_contracts(request(6)).await.err().unwrap();
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert!(service.get_active_contracts(request(5)).await.is_ok());
    }
}
