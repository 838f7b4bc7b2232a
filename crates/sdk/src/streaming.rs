//! Aggregation of server streams into one result.
//!
//! A [`StreamAggregator`] folds the chunks of a server stream into a single
//! value through a [`ChunkAccumulator`], and settles exactly once:
//! resolved on stream end, rejected on the first failure.

use std::{fmt, mem};

use daml_ledger_proto::proto;
use daml_ledger_types::ContractEntry;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tonic::{Code, Status};

use crate::error::{Result, SdkError};

/// Folds stream chunks into an aggregate.
pub trait ChunkAccumulator: Send {
    /// One message of the stream.
    type Chunk: Send + 'static;
    /// The aggregate delivered on stream end.
    type Output: Send;

    /// Adds one chunk, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk cannot be decoded; the stream is then
    /// rejected.
    fn absorb(&mut self, chunk: Self::Chunk) -> Result<()>;

    /// Produces the aggregate.
    fn finish(self) -> Self::Output;
}

/// Observable state of a [`StreamAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Subscribed, no chunk received yet.
    Open,
    /// At least one chunk received.
    Accumulating,
    /// Resolved or rejected. Terminal.
    Closed,
}

/// Drives a server stream to a single outcome.
///
/// # State Machine
///
/// ```text
/// ┌──────┐  chunk   ┌──────────────┐ ◀─┐
/// │ Open │ ───────▶ │ Accumulating │ ──┘ chunk
/// └──────┘          └──────────────┘
///    │  end / error        │  end / error
///    ▼                     ▼
/// ┌──────────────────────────────────┐
/// │              Closed              │  (later events ignored)
/// └──────────────────────────────────┘
/// ```
///
/// A failure discards everything accumulated so far.
pub struct StreamAggregator<A: ChunkAccumulator> {
    state: AggregatorState<A>,
    chunks: u64,
}

enum AggregatorState<A> {
    Open(A),
    Accumulating(A),
    Closed,
}

impl<A: ChunkAccumulator> fmt::Debug for StreamAggregator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamAggregator")
            .field("phase", &self.phase())
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl<A: ChunkAccumulator> StreamAggregator<A> {
    /// Creates an open aggregator.
    #[must_use]
    pub fn new(accumulator: A) -> Self {
        Self { state: AggregatorState::Open(accumulator), chunks: 0 }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self.state {
            AggregatorState::Open(_) => Phase::Open,
            AggregatorState::Accumulating(_) => Phase::Accumulating,
            AggregatorState::Closed => Phase::Closed,
        }
    }

    /// Number of chunks accepted before closing.
    #[must_use]
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Accepts one chunk. Ignored once closed.
    ///
    /// # Errors
    ///
    /// Returns the decoding failure of the chunk, which closes the
    /// aggregator.
    pub fn on_chunk(&mut self, chunk: A::Chunk) -> Result<()> {
        let mut accumulator = match mem::replace(&mut self.state, AggregatorState::Closed) {
            AggregatorState::Open(acc) | AggregatorState::Accumulating(acc) => acc,
            AggregatorState::Closed => {
                tracing::trace!("Chunk after close ignored");
                return Ok(());
            },
        };
        // A failed chunk leaves the state Closed
        accumulator.absorb(chunk)?;
        self.chunks += 1;
        self.state = AggregatorState::Accumulating(accumulator);
        Ok(())
    }

    /// Closes normally, delivering the aggregate. `None` once closed.
    pub fn on_end(&mut self) -> Option<A::Output> {
        match mem::replace(&mut self.state, AggregatorState::Closed) {
            AggregatorState::Open(acc) | AggregatorState::Accumulating(acc) => Some(acc.finish()),
            AggregatorState::Closed => None,
        }
    }

    /// Closes with a failure, discarding partial results.
    ///
    /// Returns the error to report, or `None` if already closed.
    pub fn on_error(&mut self, error: SdkError) -> Option<SdkError> {
        match mem::replace(&mut self.state, AggregatorState::Closed) {
            AggregatorState::Open(_) | AggregatorState::Accumulating(_) => Some(error),
            AggregatorState::Closed => None,
        }
    }

    /// Rejects with `error` unless already closed.
    ///
    /// # Errors
    ///
    /// Always returns an error: `error`, or a precondition failure if the
    /// aggregator had already settled.
    pub fn fail(&mut self, error: SdkError) -> Result<A::Output> {
        Err(self.on_error(error).unwrap_or_else(already_closed))
    }

    /// Feeds `stream` until it ends or fails.
    ///
    /// # Errors
    ///
    /// Returns the first transport or decoding failure, or a precondition
    /// failure if the aggregator had already settled.
    pub async fn drive<S>(&mut self, stream: S) -> Result<A::Output>
    where
        S: Stream<Item = std::result::Result<A::Chunk, Status>>,
    {
        if self.phase() == Phase::Closed {
            return Err(already_closed());
        }

        let mut stream = std::pin::pin!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => self.on_chunk(chunk)?,
                Err(status) => return self.fail(status.into()),
            }
            if self.chunks.is_multiple_of(100) {
                tracing::debug!(chunks = self.chunks, "Stream progress");
            }
        }
        self.on_end().ok_or_else(already_closed)
    }
}

fn already_closed() -> SdkError {
    SdkError::rpc(Code::FailedPrecondition, "Stream already closed")
}

/// The active contract set as of an offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContracts {
    /// Entries in arrival order.
    pub contracts: Vec<ContractEntry>,
    /// Offset the snapshot was taken at.
    pub offset: i64,
}

/// Accumulates `GetActiveContracts` chunks of a snapshot at a known offset.
#[derive(Debug, Default)]
pub struct ActiveContractsAccumulator {
    contracts: Vec<ContractEntry>,
    offset: i64,
}

impl ActiveContractsAccumulator {
    /// Creates an empty accumulator for the snapshot at `offset`.
    #[must_use]
    pub fn new(offset: i64) -> Self {
        Self { contracts: Vec::new(), offset }
    }
}

impl ChunkAccumulator for ActiveContractsAccumulator {
    type Chunk = proto::GetActiveContractsResponse;
    type Output = ActiveContracts;

    fn absorb(&mut self, chunk: Self::Chunk) -> Result<()> {
        match chunk.contract_entry {
            Some(entry) => self.contracts.push(ContractEntry::try_from(entry)?),
            None => {
                tracing::debug!(workflow_id = %chunk.workflow_id, "Chunk without contract entry");
            },
        }
        Ok(())
    }

    fn finish(self) -> Self::Output {
        ActiveContracts { contracts: self.contracts, offset: self.offset }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use daml_ledger_proto::proto::get_active_contracts_response::ContractEntry as WireEntry;
    use futures::stream;
    use proptest::prelude::*;

    use super::*;

    fn entry(contract_id: &str) -> WireEntry {
        WireEntry::ActiveContract(proto::ActiveContract {
            created_event: Some(proto::CreatedEvent {
                contract_id: contract_id.to_owned(),
                template_id: Some(proto::Identifier {
                    package_id: "pkg".to_owned(),
                    module_name: "Main".to_owned(),
                    entity_name: "Asset".to_owned(),
                }),
                ..Default::default()
            }),
            synchronizer_id: "sync".to_owned(),
            reassignment_counter: 0,
        })
    }

    fn chunk(
        contract_id: Option<&str>,
    ) -> std::result::Result<proto::GetActiveContractsResponse, Status> {
        Ok(proto::GetActiveContractsResponse {
            workflow_id: String::new(),
            contract_entry: contract_id.map(entry),
        })
    }

    fn aggregator() -> StreamAggregator<ActiveContractsAccumulator> {
        StreamAggregator::new(ActiveContractsAccumulator::new(15))
    }

    #[tokio::test]
    async fn entries_in_order_at_snapshot_offset() {
        let chunks = vec![chunk(Some("X")), chunk(Some("Y")), chunk(None)];
        let mut aggregator = aggregator();
        let result = aggregator.drive(stream::iter(chunks)).await.unwrap();

        let ids: Vec<_> = result.contracts.iter().map(ContractEntry::contract_id).collect();
        assert_eq!(ids, ["X", "Y"]);
        assert_eq!(result.offset, 15);
        assert_eq!(aggregator.chunks(), 3);
        assert_eq!(aggregator.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn empty_stream_resolves_with_snapshot_offset() {
        let mut aggregator = aggregator();
        let result = aggregator.drive(stream::iter(Vec::new())).await.unwrap();
        assert_eq!(result, ActiveContracts { contracts: Vec::new(), offset: 15 });
    }

    #[tokio::test]
    async fn error_after_first_chunk_rejects() {
        let chunks = vec![chunk(Some("X")), Err(Status::unavailable("gone"))];
        let mut aggregator = aggregator();
        let err = aggregator.drive(stream::iter(chunks)).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::Unavailable));
        assert_eq!(aggregator.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn undecodable_chunk_rejects() {
        let bad = proto::GetActiveContractsResponse {
            workflow_id: String::new(),
            contract_entry: Some(WireEntry::ActiveContract(proto::ActiveContract::default())),
        };
        let mut aggregator = aggregator();
        let err = aggregator.drive(stream::iter(vec![Ok(bad)])).await.unwrap_err();
        assert!(matches!(err, SdkError::Model { .. }));
    }

    #[tokio::test]
    async fn drive_after_close_is_rejected() {
        let mut aggregator = aggregator();
        aggregator.drive(stream::iter(Vec::new())).await.unwrap();
        let err = aggregator.drive(stream::iter(vec![chunk(Some("X"))])).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::FailedPrecondition));
    }

    #[test]
    fn phases_follow_transitions() {
        let mut aggregator = aggregator();
        assert_eq!(aggregator.phase(), Phase::Open);
        aggregator.on_chunk(chunk(None).unwrap()).unwrap();
        assert_eq!(aggregator.phase(), Phase::Accumulating);
        assert_eq!(aggregator.on_end().unwrap().offset, 15);
        assert_eq!(aggregator.phase(), Phase::Closed);
    }

    #[test]
    fn closure_is_idempotent() {
        let mut aggregator = aggregator();
        aggregator.on_chunk(chunk(Some("X")).unwrap()).unwrap();
        assert!(aggregator.on_error(SdkError::Shutdown).is_some());

        // Nothing settles twice
        assert!(aggregator.on_end().is_none());
        assert!(aggregator.on_error(SdkError::Shutdown).is_none());
        aggregator.on_chunk(chunk(Some("Y")).unwrap()).unwrap();
        assert_eq!(aggregator.chunks(), 1);
        assert_eq!(aggregator.phase(), Phase::Closed);
    }

    #[test]
    fn active_contracts_serialize_as_plain_fields() {
        let json = serde_json::to_string(&ActiveContracts::default()).unwrap();
        assert_eq!(json, r#"{"contracts":[],"offset":0}"#);
    }

    proptest! {
        #[test]
        fn entries_keep_arrival_order(present in proptest::collection::vec(any::<bool>(), 0..20)) {
            let mut aggregator = aggregator();
            let mut expected = Vec::new();
            for (i, has_entry) in present.iter().enumerate() {
                let contract_id = format!("c{i}");
                if *has_entry {
                    expected.push(contract_id.clone());
                }
                let chunk = chunk(has_entry.then_some(contract_id.as_str())).unwrap();
                aggregator.on_chunk(chunk).unwrap();
            }
            let result = aggregator.on_end().unwrap();

            let ids: Vec<&str> = result.contracts.iter().map(ContractEntry::contract_id).collect();
            prop_assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(result.offset, 15);
            prop_assert_eq!(aggregator.chunks(), present.len() as u64);
        }
    }
}
