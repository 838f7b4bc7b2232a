//! Ledger-mutating commands and the [`Commands`] submission envelope.
//!
//! [`Command`] is a closed sum type with no "empty" variant, so every command
//! handed to the wire converter maps to a populated wire command.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{Identifier, Value, value::Record};

/// One atomic ledger-mutating instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Create a contract from a template.
    Create(CreateCommand),
    /// Exercise a choice on a contract by id.
    Exercise(ExerciseCommand),
    /// Exercise a choice on a contract located by key.
    ExerciseByKey(ExerciseByKeyCommand),
    /// Create a contract and immediately exercise a choice on it.
    CreateAndExercise(CreateAndExerciseCommand),
}

impl Command {
    /// Creates a `create` command.
    #[must_use]
    pub fn create(template_id: Identifier, create_arguments: Record) -> Self {
        Self::Create(CreateCommand { template_id, create_arguments })
    }

    /// Creates an `exercise` command.
    pub fn exercise(
        template_id: Identifier,
        contract_id: impl Into<String>,
        choice: impl Into<String>,
        choice_argument: Value,
    ) -> Self {
        Self::Exercise(ExerciseCommand {
            template_id,
            contract_id: contract_id.into(),
            choice: choice.into(),
            choice_argument,
        })
    }

    /// Creates an `exerciseByKey` command.
    pub fn exercise_by_key(
        template_id: Identifier,
        contract_key: Value,
        choice: impl Into<String>,
        choice_argument: Value,
    ) -> Self {
        Self::ExerciseByKey(ExerciseByKeyCommand {
            template_id,
            contract_key,
            choice: choice.into(),
            choice_argument,
        })
    }

    /// Creates a `createAndExercise` command.
    pub fn create_and_exercise(
        template_id: Identifier,
        create_arguments: Record,
        choice: impl Into<String>,
        choice_argument: Value,
    ) -> Self {
        Self::CreateAndExercise(CreateAndExerciseCommand {
            template_id,
            create_arguments,
            choice: choice.into(),
            choice_argument,
        })
    }

    /// Returns the template (or interface) this command targets.
    #[must_use]
    pub fn template_id(&self) -> &Identifier {
        match self {
            Self::Create(c) => &c.template_id,
            Self::Exercise(c) => &c.template_id,
            Self::ExerciseByKey(c) => &c.template_id,
            Self::CreateAndExercise(c) => &c.template_id,
        }
    }
}

/// Creates a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCommand {
    /// Template to instantiate.
    pub template_id: Identifier,
    /// Template arguments.
    pub create_arguments: Record,
}

/// Exercises a choice on a contract by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseCommand {
    /// Template or interface declaring the choice.
    pub template_id: Identifier,
    /// Target contract.
    pub contract_id: String,
    /// Choice name.
    pub choice: String,
    /// Choice argument.
    pub choice_argument: Value,
}

/// Exercises a choice on a contract located by its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseByKeyCommand {
    /// Template declaring the key and choice.
    pub template_id: Identifier,
    /// Contract key.
    pub contract_key: Value,
    /// Choice name.
    pub choice: String,
    /// Choice argument.
    pub choice_argument: Value,
}

/// Creates a contract and exercises a choice on it in one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAndExerciseCommand {
    /// Template to instantiate.
    pub template_id: Identifier,
    /// Template arguments.
    pub create_arguments: Record,
    /// Choice name.
    pub choice: String,
    /// Choice argument.
    pub choice_argument: Value,
}

/// How far back the ledger should look for duplicate submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeduplicationPeriod {
    /// Deduplicate within a time window ending at submission.
    Duration(Duration),
    /// Deduplicate against everything after this ledger offset.
    Offset(i64),
}

/// Lower bound on the ledger time assigned to the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MinLedgerTime {
    /// Absolute lower bound.
    Absolute(SystemTime),
    /// Bound relative to the submission time.
    Relative(Duration),
}

/// A contract passed to the submission so it need not be visible to the submitters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosedContract {
    /// Template of the contract.
    pub template_id: Identifier,
    /// The contract id.
    pub contract_id: String,
    /// Opaque created-event blob obtained from the active contract stream.
    pub created_event_blob: Vec<u8>,
    /// Synchronizer the contract is assigned to, if known.
    pub synchronizer_id: Option<String>,
}

/// A contract key the participant should prefetch before interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchContractKey {
    /// Template declaring the key.
    pub template_id: Identifier,
    /// The key value.
    pub contract_key: Value,
}

/// A batch of commands submitted atomically, with routing and deduplication metadata.
///
/// Optional fields left unset are left unset on the wire. The only fields the
/// client fills in itself are `command_id` and `act_as`, and only when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commands {
    /// Workflow this submission belongs to.
    pub workflow_id: Option<String>,
    /// Submitting user.
    pub user_id: Option<String>,
    /// Unique command id used for deduplication and completion correlation.
    pub command_id: Option<String>,
    /// Commands executed in order within one transaction.
    pub commands: Vec<Command>,
    /// Parties on whose behalf the commands act.
    pub act_as: Vec<String>,
    /// Additional parties whose visibility is used for reads.
    pub read_as: Vec<String>,
    /// Deduplication window.
    pub deduplication_period: Option<DeduplicationPeriod>,
    /// Lower bound on ledger time.
    pub min_ledger_time: Option<MinLedgerTime>,
    /// Submission id for correlating rejections.
    pub submission_id: Option<String>,
    /// Contracts disclosed to the submission.
    pub disclosed_contracts: Vec<DisclosedContract>,
    /// Synchronizer to route the transaction through.
    pub synchronizer_id: Option<String>,
    /// Preferred package ids for package-name resolution.
    pub package_id_selection_preference: Vec<String>,
    /// Contract keys to prefetch.
    pub prefetch_contract_keys: Vec<PrefetchContractKey>,
}

impl Commands {
    /// Creates a batch from commands, leaving all metadata unset.
    #[must_use]
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands, ..Self::default() }
    }

    /// Sets the workflow id.
    #[must_use]
    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Sets the user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the command id.
    #[must_use]
    pub fn with_command_id(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = Some(command_id.into());
        self
    }

    /// Appends a command.
    #[must_use]
    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Sets the acting parties.
    #[must_use]
    pub fn with_act_as<I, S>(mut self, parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.act_as = parties.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the reading parties.
    #[must_use]
    pub fn with_read_as<I, S>(mut self, parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_as = parties.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the deduplication period.
    #[must_use]
    pub fn with_deduplication(mut self, period: DeduplicationPeriod) -> Self {
        self.deduplication_period = Some(period);
        self
    }

    /// Sets the minimum ledger time.
    #[must_use]
    pub fn with_min_ledger_time(mut self, bound: MinLedgerTime) -> Self {
        self.min_ledger_time = Some(bound);
        self
    }

    /// Sets the submission id.
    #[must_use]
    pub fn with_submission_id(mut self, submission_id: impl Into<String>) -> Self {
        self.submission_id = Some(submission_id.into());
        self
    }

    /// Appends a disclosed contract.
    #[must_use]
    pub fn with_disclosed_contract(mut self, contract: DisclosedContract) -> Self {
        self.disclosed_contracts.push(contract);
        self
    }

    /// Sets the synchronizer to route through.
    #[must_use]
    pub fn with_synchronizer_id(mut self, synchronizer_id: impl Into<String>) -> Self {
        self.synchronizer_id = Some(synchronizer_id.into());
        self
    }

    /// Sets the package preference list.
    #[must_use]
    pub fn with_package_preference<I, S>(mut self, package_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.package_id_selection_preference = package_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a contract key to prefetch.
    #[must_use]
    pub fn with_prefetch_key(mut self, key: PrefetchContractKey) -> Self {
        self.prefetch_contract_keys.push(key);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn iou() -> Identifier {
        Identifier::new("pkg", "Iou", "Iou").unwrap()
    }

    #[test]
    fn template_id_is_reported_for_every_variant() {
        let commands = [
            Command::create(iou(), Record::new()),
            Command::exercise(iou(), "#1:0", "Transfer", Value::Unit),
            Command::exercise_by_key(iou(), Value::party("Alice"), "Archive", Value::Unit),
            Command::create_and_exercise(iou(), Record::new(), "Split", Value::Unit),
        ];
        for command in &commands {
            assert_eq!(command.template_id(), &iou());
        }
    }

    #[test]
    fn builder_leaves_unset_metadata_absent() {
        let commands = Commands::new(vec![Command::create(iou(), Record::new())])
            .with_act_as(["Alice"])
            .with_deduplication(DeduplicationPeriod::Offset(42));

        assert_eq!(commands.act_as, vec!["Alice".to_string()]);
        assert_eq!(commands.deduplication_period, Some(DeduplicationPeriod::Offset(42)));
        assert!(commands.command_id.is_none());
        assert!(commands.workflow_id.is_none());
        assert!(commands.min_ledger_time.is_none());
        assert!(commands.read_as.is_empty());
    }
}
