//! Entries of the active contract set.

use serde::{Deserialize, Serialize};

use crate::event::CreatedEvent;

/// A contract active on a synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContract {
    /// The event that created the contract.
    pub created_event: CreatedEvent,
    /// Synchronizer the contract is assigned to.
    pub synchronizer_id: String,
    /// Number of reassignments the contract went through.
    pub reassignment_counter: u64,
}

/// A contract in flight between synchronizers: unassigned but not yet assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteReassignment {
    /// The event that created the contract.
    pub created_event: CreatedEvent,
    /// Id of the reassignment.
    pub reassignment_id: String,
    /// Source synchronizer.
    pub source: String,
    /// Target synchronizer.
    pub target: String,
}

/// One entry of the active contract set as streamed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractEntry {
    /// An assigned, active contract.
    Active(ActiveContract),
    /// Unassigned from the source; the assignment has not been observed yet.
    IncompleteUnassigned(IncompleteReassignment),
    /// Assigned to the target; the unassignment has not been observed yet.
    IncompleteAssigned(IncompleteReassignment),
}

impl ContractEntry {
    /// Returns the created event underlying this entry.
    #[must_use]
    pub fn created_event(&self) -> &CreatedEvent {
        match self {
            Self::Active(c) => &c.created_event,
            Self::IncompleteUnassigned(r) | Self::IncompleteAssigned(r) => &r.created_event,
        }
    }

    /// Returns the contract id.
    #[must_use]
    pub fn contract_id(&self) -> &str {
        &self.created_event().contract_id
    }
}
