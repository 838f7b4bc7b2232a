//! Per-command completion results.

use serde::{Deserialize, Serialize};

/// Outcome status attached to a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStatus {
    /// gRPC-style status code; 0 means success.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

/// Result of a previously submitted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Command id of the submission this completes.
    pub command_id: String,
    /// Outcome; absent means success.
    pub status: Option<CompletionStatus>,
    /// Update id of the committed transaction; present iff successful.
    pub update_id: Option<String>,
    /// Submission id, if one was given.
    pub submission_id: Option<String>,
    /// Parties the command acted on behalf of.
    pub act_as: Vec<String>,
    /// Offset of the completion in the completion stream.
    pub offset: i64,
    /// Synchronizer that processed the submission.
    pub synchronizer_id: String,
}

impl Completion {
    /// Returns true if the command succeeded.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        is_successful_completion(self)
    }
}

/// Returns true iff `status` is absent or carries code 0.
#[must_use]
pub fn is_successful_completion(completion: &Completion) -> bool {
    completion.status.as_ref().is_none_or(|status| status.code == 0)
}
