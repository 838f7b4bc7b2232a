//! Deadline-bounded call execution.
//!
//! Every call gets an absolute deadline computed when the call starts, not
//! when the client was built. The deadline travels to the server as
//! `grpc-timeout` and is enforced locally as well, so a stalled connection
//! fails with `DeadlineExceeded` rather than hanging.
//!
//! Failures of any origin come back as [`SdkError::Rpc`]. Nothing here
//! retries.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tonic::Code;

use crate::{
    error::{Result, SdkError},
    metrics::SdkMetrics,
    registry::{MethodKind, ServiceClient},
    streaming::{ChunkAccumulator, StreamAggregator},
};

/// Runs calls against cached service clients.
#[derive(Debug, Clone)]
pub struct CallExecutor {
    timeout: Duration,
    metrics: Arc<dyn SdkMetrics>,
}

impl CallExecutor {
    /// Creates an executor applying `timeout` to every call.
    #[must_use]
    pub fn new(timeout: Duration, metrics: Arc<dyn SdkMetrics>) -> Self {
        Self { timeout, metrics }
    }

    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deadline for a call starting now.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// Invokes a unary method and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnknownMethod`] without sending anything if the
    /// service does not expose `method`, otherwise the normalized failure of
    /// the call. Expiry of the deadline yields code `DeadlineExceeded`.
    pub async fn unary<Req, Resp>(
        &self,
        client: &ServiceClient,
        method: &str,
        request: Req,
    ) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let descriptor = client.method(method, MethodKind::Unary)?;
        let deadline = self.deadline();
        let mut request = tonic::Request::new(request);
        request.set_timeout(self.timeout);

        let service = client.name();
        let timeout_ms = self.timeout.as_millis() as u64;
        tracing::debug!(service, method, timeout_ms, "Starting call");

        let started = Instant::now();
        let outcome = match tokio::time::timeout_at(deadline, client.unary(descriptor, request)).await
        {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(self.past_deadline(SdkError::from(status), deadline)),
            Err(_) => Err(deadline_exceeded(self.timeout)),
        };
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        self.metrics.record_request(descriptor.path, elapsed, outcome.is_ok());
        match &outcome {
            Ok(_) => tracing::debug!(service, method, timeout_ms, elapsed_ms, "Call finished"),
            Err(e) => {
                tracing::warn!(service, method, timeout_ms, elapsed_ms, error = %e, "Call failed");
            },
        }
        outcome
    }

    /// Opens a server stream.
    ///
    /// With a `deadline`, it is sent as `grpc-timeout` and bounds the open;
    /// without one the stream may stay open indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnknownMethod`] for a method the service does not
    /// stream, or the normalized failure of opening the stream.
    pub async fn server_streaming<Req, Resp>(
        &self,
        client: &ServiceClient,
        method: &str,
        request: Req,
        deadline: Option<Instant>,
    ) -> Result<tonic::Streaming<Resp>>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let descriptor = client.method(method, MethodKind::ServerStreaming)?;
        let mut request = tonic::Request::new(request);
        tracing::debug!(service = client.name(), method, bounded = deadline.is_some(), "Opening stream");

        let response = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                request.set_timeout(remaining);
                tokio::time::timeout_at(deadline, client.server_streaming(descriptor, request))
                    .await
                    .map_err(|_| deadline_exceeded(self.timeout))?
            },
            None => client.server_streaming(descriptor, request).await,
        };
        response.map(tonic::Response::into_inner).map_err(|status| {
            let err = SdkError::from(status);
            tracing::warn!(service = client.name(), method, error = %err, "Stream open failed");
            err
        })
    }

    /// Opens a server stream and folds it into one result.
    ///
    /// The call's deadline covers the whole aggregation, from opening the
    /// stream to its last chunk. Partial results are discarded on failure.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure of the stream, a decoding failure of
    /// any chunk, or `DeadlineExceeded` if the stream outlives the deadline.
    pub async fn aggregate<Req, A>(
        &self,
        client: &ServiceClient,
        method: &str,
        request: Req,
        accumulator: A,
    ) -> Result<A::Output>
    where
        Req: prost::Message + Send + Sync + 'static,
        A: ChunkAccumulator,
        A::Chunk: prost::Message + Default + Send + Sync + 'static,
    {
        let deadline = self.deadline();
        let path = client.method(method, MethodKind::ServerStreaming)?.path;
        let stream = self
            .server_streaming(client, method, request, Some(deadline))
            .await
            .map_err(|e| self.past_deadline(e, deadline))?;

        let mut aggregator = StreamAggregator::new(accumulator);
        let timed = tokio::time::timeout_at(deadline, aggregator.drive(stream)).await;
        let outcome = match timed {
            Ok(outcome) => outcome.map_err(|e| self.past_deadline(e, deadline)),
            Err(_) => aggregator.fail(deadline_exceeded(self.timeout)),
        };

        let chunks = aggregator.chunks();
        self.metrics.record_stream(path, chunks, outcome.is_ok());
        match &outcome {
            Ok(_) => tracing::debug!(service = client.name(), method, chunks, "Stream aggregated"),
            Err(e) => {
                tracing::warn!(service = client.name(), method, chunks, error = %e, "Stream failed");
            },
        }
        outcome
    }

    /// Reports a cancellation that arrives once the deadline has passed as
    /// the deadline expiry it is. The server enforces `grpc-timeout` too and
    /// may answer first.
    fn past_deadline(&self, err: SdkError, deadline: Instant) -> SdkError {
        let late = matches!(err.code(), Some(Code::Cancelled | Code::DeadlineExceeded));
        if late && Instant::now() >= deadline { deadline_exceeded(self.timeout) } else { err }
    }
}

fn deadline_exceeded(timeout: Duration) -> SdkError {
    SdkError::rpc(
        Code::DeadlineExceeded,
        format!("Deadline exceeded after {}ms", timeout.as_millis()),
    )
}
