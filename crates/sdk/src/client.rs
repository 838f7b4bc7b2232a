//! Main `LedgerClient` implementation.
//!
//! Provides the high-level API for the Ledger API: converting domain values
//! to wire messages, resolving cached service clients and running each call
//! under its own deadline.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use daml_ledger_proto::{
    convert::{event_format, parse_offset, transaction_format},
    proto,
};
use daml_ledger_types::{
    Commands, Completion, ModelError, Transaction, TransactionFilter, TransactionTree,
};
use futures::{Stream, StreamExt, future};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::TokenStore,
    config::ClientConfig,
    connection::ConnectionPool,
    error::{Result, SdkError},
    executor::CallExecutor,
    registry::{
        COMMAND_COMPLETION_SERVICE, COMMAND_SERVICE, COMMAND_SUBMISSION_SERVICE, STATE_SERVICE,
        SchemaCatalog, ServiceClient, ServiceDescriptor, ServiceRegistry, VERSION_SERVICE, schema,
    },
    streaming::{ActiveContracts, ActiveContractsAccumulator},
};

// =============================================================================
// Command Service Types
// =============================================================================

/// Result of a successful `submit_and_wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitAndWaitResult {
    /// Id of the update the commands produced.
    pub update_id: String,
    /// Offset at which the completion was recorded.
    pub completion_offset: i64,
}

// =============================================================================
// State Service Types
// =============================================================================

/// Options for [`LedgerClient::get_active_contracts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetActiveContractsOptions {
    /// Which parties' contracts to return, and which templates or interfaces.
    pub filter: TransactionFilter,
    /// Ask for verbose values (labelled record fields).
    pub verbose: bool,
    /// Snapshot offset; the ledger end when unset.
    pub active_at_offset: Option<i64>,
}

impl GetActiveContractsOptions {
    /// Options for `filter` at the ledger end, non-verbose.
    #[must_use]
    pub fn new(filter: TransactionFilter) -> Self {
        Self { filter, verbose: false, active_at_offset: None }
    }

    /// Sets verbosity.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the snapshot offset.
    #[must_use]
    pub fn with_active_at_offset(mut self, offset: i64) -> Self {
        self.active_at_offset = Some(offset);
        self
    }
}

/// Options for [`LedgerClient::completion_stream`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionStreamOptions {
    /// Submitting user; the configured user when unset.
    pub user_id: Option<String>,
    /// Parties whose completions to stream; the configured party when empty.
    pub parties: Vec<String>,
    /// Stream completions strictly after this offset.
    pub begin_exclusive: i64,
}

impl CompletionStreamOptions {
    /// Options streaming from the ledger start.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the submitting user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Adds a party.
    #[must_use]
    pub fn with_party(mut self, party: impl Into<String>) -> Self {
        self.parties.push(party.into());
        self
    }

    /// Sets the exclusive start offset.
    #[must_use]
    pub fn with_begin_exclusive(mut self, offset: i64) -> Self {
        self.begin_exclusive = offset;
        self
    }
}

// =============================================================================
// LedgerClient
// =============================================================================

/// High-level client for the Daml Ledger API.
///
/// `LedgerClient` orchestrates:
/// - A service registry caching one client per schema service
/// - A call executor applying a fresh deadline to every call
/// - Bearer-token propagation with wholesale rotation
/// - Command defaulting (command id, `actAs`, user id)
///
/// Clones share the same channel, cache and credential.
///
/// # Close Behavior
///
/// When [`close()`](Self::close) is called:
/// 1. In-flight calls are abandoned with `SdkError::Shutdown`
/// 2. New calls immediately fail with `SdkError::Shutdown`
/// 3. Cached service clients and the channel are released
///
/// # Example
///
/// ```no_run
/// # use daml_ledger_sdk::{ClientConfig, LedgerClient};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::builder()
///     .with_endpoint("localhost:6865")
///     .with_party("Alice::1220")
///     .build()?;
///
/// let client = LedgerClient::new(config)?;
/// println!("ledger end: {}", client.get_ledger_end().await?);
///
/// client.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LedgerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    registry: ServiceRegistry,
    executor: CallExecutor,
    tokens: TokenStore,
    closed: AtomicBool,
    /// Cancelled by `close()` to abandon in-flight calls.
    cancellation: CancellationToken,
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("endpoint", &self.inner.config.endpoint())
            .field("cached_services", &self.inner.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LedgerClient {
    /// Creates a new `LedgerClient` with the given configuration.
    ///
    /// Nothing connects here: the channel is built on the first call, inside
    /// the caller's Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configured token is not valid
    /// header text.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let tokens = TokenStore::new(config.token.as_deref())?;
        let executor = CallExecutor::new(config.timeout(), Arc::clone(config.metrics()));
        let registry = ServiceRegistry::new(
            SchemaCatalog::ledger_api_v2(),
            ConnectionPool::new(config.clone()),
            tokens.clone(),
        );
        tracing::debug!(endpoint = config.endpoint(), "Created ledger client");

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                registry,
                executor,
                tokens,
                closed: AtomicBool::new(false),
                cancellation: CancellationToken::new(),
            }),
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the service client for `path` declared in schema `file`.
    ///
    /// Repeated lookups return the same client until [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// Returns `SdkError::SchemaNotFound` or `SdkError::ServiceNotFound` if
    /// the lookup does not resolve, `SdkError::Shutdown` once closed.
    pub fn service(&self, file: &str, path: &str) -> Result<Arc<ServiceClient>> {
        self.ensure_open()?;
        self.inner.registry.service(file, path)
    }

    /// Returns the Ledger API version reported by the server.
    ///
    /// # Errors
    ///
    /// Returns the normalized call failure.
    pub async fn get_version(&self) -> Result<String> {
        let client = self.client(schema::VERSION_SERVICE, &VERSION_SERVICE)?;
        let response: proto::GetLedgerApiVersionResponse = self
            .cancellable(self.inner.executor.unary(
                &client,
                "GetLedgerApiVersion",
                proto::GetLedgerApiVersionRequest {},
            ))
            .await?;
        Ok(response.version)
    }

    /// Submits commands and waits for their completion.
    ///
    /// A missing command id is generated, a missing `actAs` defaults to the
    /// configured party and a missing user id to the configured user.
    ///
    /// # Errors
    ///
    /// Returns the ledger's rejection (duplicate command, unknown party,
    /// time bounds, ...) as a normalized call failure, or a representation
    /// error if the completion offset cannot be decoded.
    pub async fn submit_and_wait(&self, commands: Commands) -> Result<SubmitAndWaitResult> {
        let commands = self.prepare(commands);
        let client = self.client(schema::COMMAND_SERVICE, &COMMAND_SERVICE)?;
        let response: proto::SubmitAndWaitResponse = self
            .cancellable(self.inner.executor.unary(
                &client,
                "SubmitAndWait",
                proto::SubmitAndWaitRequest { commands: Some((&commands).into()) },
            ))
            .await?;
        Ok(SubmitAndWaitResult {
            update_id: response.update_id,
            completion_offset: parse_offset(response.completion_offset)?,
        })
    }

    /// Submits commands and returns the resulting flat transaction.
    ///
    /// Without a `filter`, the transaction shows every event visible to the
    /// acting parties.
    ///
    /// # Errors
    ///
    /// Returns the normalized call failure or a representation error.
    pub async fn submit_and_wait_for_transaction(
        &self,
        commands: Commands,
        filter: Option<TransactionFilter>,
    ) -> Result<Transaction> {
        let commands = self.prepare(commands);
        let filter =
            filter.unwrap_or_else(|| TransactionFilter::wildcard_for(commands.act_as.iter()));
        let client = self.client(schema::COMMAND_SERVICE, &COMMAND_SERVICE)?;
        let response: proto::SubmitAndWaitForTransactionResponse = self
            .cancellable(self.inner.executor.unary(
                &client,
                "SubmitAndWaitForTransaction",
                proto::SubmitAndWaitForTransactionRequest {
                    commands: Some((&commands).into()),
                    transaction_format: Some(transaction_format(&filter, true)),
                },
            ))
            .await?;
        let transaction = response.transaction.ok_or(ModelError::MissingField {
            message: "SubmitAndWaitForTransactionResponse",
            field: "transaction",
        })?;
        Ok(Transaction::try_from(transaction)?)
    }

    /// Submits commands and returns the resulting transaction tree.
    ///
    /// # Errors
    ///
    /// Returns the normalized call failure or a representation error.
    pub async fn submit_and_wait_for_transaction_tree(
        &self,
        commands: Commands,
    ) -> Result<TransactionTree> {
        let commands = self.prepare(commands);
        let client = self.client(schema::COMMAND_SERVICE, &COMMAND_SERVICE)?;
        let response: proto::SubmitAndWaitForTransactionTreeResponse = self
            .cancellable(self.inner.executor.unary(
                &client,
                "SubmitAndWaitForTransactionTree",
                proto::SubmitAndWaitRequest { commands: Some((&commands).into()) },
            ))
            .await?;
        let tree = response.transaction.ok_or(ModelError::MissingField {
            message: "SubmitAndWaitForTransactionTreeResponse",
            field: "transaction",
        })?;
        Ok(TransactionTree::try_from(tree)?)
    }

    /// Submits commands without waiting for their outcome.
    ///
    /// Returns the command id, which matches the eventual completion on
    /// [`completion_stream`](Self::completion_stream).
    ///
    /// # Errors
    ///
    /// Returns the normalized call failure if the submission is rejected
    /// synchronously.
    pub async fn submit(&self, commands: Commands) -> Result<String> {
        let commands = self.prepare(commands);
        let client = self.client(schema::COMMAND_SUBMISSION_SERVICE, &COMMAND_SUBMISSION_SERVICE)?;
        let _: proto::SubmitResponse = self
            .cancellable(self.inner.executor.unary(
                &client,
                "Submit",
                proto::SubmitRequest { commands: Some((&commands).into()) },
            ))
            .await?;
        Ok(commands.command_id.unwrap_or_default())
    }

    /// Returns the current ledger end offset.
    ///
    /// # Errors
    ///
    /// Returns the normalized call failure or a representation error.
    pub async fn get_ledger_end(&self) -> Result<i64> {
        let client = self.client(schema::STATE_SERVICE, &STATE_SERVICE)?;
        let response: proto::GetLedgerEndResponse = self
            .cancellable(self.inner.executor.unary(
                &client,
                "GetLedgerEnd",
                proto::GetLedgerEndRequest {},
            ))
            .await?;
        Ok(parse_offset(response.offset)?)
    }

    /// Returns the active contract set matching `options`.
    ///
    /// The snapshot is taken at `active_at_offset`, or at the ledger end read
    /// just before when unset, and that offset is returned with the entries.
    /// The stream is read to its end and its entries returned in arrival
    /// order. The call's deadline covers the whole stream.
    ///
    /// # Errors
    ///
    /// Returns the ledger end lookup failure or the first stream failure;
    /// partial results are discarded.
    pub async fn get_active_contracts(
        &self,
        options: GetActiveContractsOptions,
    ) -> Result<ActiveContracts> {
        let offset = match options.active_at_offset {
            Some(offset) => offset,
            None => self.get_ledger_end().await?,
        };
        let client = self.client(schema::STATE_SERVICE, &STATE_SERVICE)?;
        let request = proto::GetActiveContractsRequest {
            filter: None,
            verbose: false,
            active_at_offset: offset,
            event_format: Some(event_format(&options.filter, options.verbose)),
        };
        self.cancellable(self.inner.executor.aggregate(
            &client,
            "GetActiveContracts",
            request,
            ActiveContractsAccumulator::new(offset),
        ))
        .await
    }

    /// Streams completions of commands submitted by a user.
    ///
    /// The stream has no deadline and ends when the server closes it or the
    /// client is closed. Offset checkpoints interleaved by the ledger are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure of opening the stream. Items carry
    /// later failures.
    pub async fn completion_stream(
        &self,
        options: CompletionStreamOptions,
    ) -> Result<impl Stream<Item = Result<Completion>> + Send + 'static> {
        let client = self.client(schema::COMMAND_COMPLETION_SERVICE, &COMMAND_COMPLETION_SERVICE)?;
        let config = &self.inner.config;
        let parties = if options.parties.is_empty() {
            config.party().map(|p| vec![p.to_owned()]).unwrap_or_default()
        } else {
            options.parties
        };
        let user_id = options.user_id.or_else(|| config.user_id().map(str::to_owned));
        let request = proto::CompletionStreamRequest {
            user_id: user_id.unwrap_or_default(),
            parties,
            begin_exclusive: options.begin_exclusive,
        };

        let stream: tonic::Streaming<proto::CompletionStreamResponse> = self
            .cancellable(self.inner.executor.server_streaming(
                &client,
                "CompletionStream",
                request,
                None,
            ))
            .await?;

        let closed = self.inner.cancellation.clone().cancelled_owned();
        Ok(stream.take_until(closed).filter_map(|item| future::ready(decode_completion(item))))
    }

    /// Replaces the bearer token used by every later call.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token is not valid header text.
    pub fn set_token(&self, token: &str) -> Result<()> {
        self.inner.tokens.set(token)
    }

    /// Removes the bearer token; later calls go out unauthenticated.
    pub fn clear_token(&self) {
        self.inner.tokens.clear();
    }

    /// Closes the client: in-flight and later calls fail with
    /// `SdkError::Shutdown`, and cached clients and the channel are released.
    ///
    /// Calling it again has no effect.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancellation.cancel();
        let released = self.inner.registry.clear();
        tracing::info!(endpoint = self.inner.config.endpoint(), released, "Ledger client closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() { Err(SdkError::Shutdown) } else { Ok(()) }
    }

    fn client(
        &self,
        file: &str,
        descriptor: &'static ServiceDescriptor,
    ) -> Result<Arc<ServiceClient>> {
        self.service(file, descriptor.full_name)
    }

    /// Runs `call`, abandoning it with `Shutdown` if the client closes first.
    async fn cancellable<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.inner.cancellation.cancelled() => Err(SdkError::Shutdown),
            result = call => result,
        }
    }

    /// Fills in the command id, `actAs` and user id when absent.
    fn prepare(&self, mut commands: Commands) -> Commands {
        let config = &self.inner.config;
        if commands.command_id.as_deref().is_none_or(str::is_empty) {
            commands.command_id = Some(uuid::Uuid::new_v4().to_string());
        }
        if commands.act_as.is_empty()
            && let Some(party) = config.party()
        {
            commands.act_as.push(party.to_owned());
        }
        if commands.user_id.is_none() {
            commands.user_id = config.user_id().map(str::to_owned);
        }
        commands
    }
}

/// Decodes one completion stream item; `None` for offset checkpoints.
fn decode_completion(
    item: std::result::Result<proto::CompletionStreamResponse, tonic::Status>,
) -> Option<Result<Completion>> {
    use proto::completion_stream_response::CompletionResponse;

    let response = match item {
        Ok(response) => response,
        Err(status) => return Some(Err(status.into())),
    };
    match response.completion_response {
        Some(CompletionResponse::Completion(completion)) => {
            Some(Completion::try_from(completion).map_err(SdkError::from))
        },
        Some(CompletionResponse::OffsetCheckpoint(checkpoint)) => {
            tracing::trace!(offset = checkpoint.offset, "Offset checkpoint");
            None
        },
        None => Some(Err(ModelError::EmptyValue { context: "CompletionStreamResponse" }.into())),
    }
}
