//! Data model for the Daml Ledger API.
//!
//! This crate provides the immutable value objects exchanged with a ledger:
//! - [`Identifier`] and the recursive [`Value`] model
//! - [`Command`] variants and the [`Commands`] submission envelope
//! - Events, flat [`Transaction`]s and [`TransactionTree`]s with traversal
//! - [`Completion`] results and [`TransactionFilter`]s
//! - Representation errors using snafu

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod completion;
pub mod contract;
pub mod error;
pub mod event;
pub mod filter;
pub mod identifier;
pub mod value;

pub use command::{
    Command, Commands, CreateAndExerciseCommand, CreateCommand, DeduplicationPeriod,
    DisclosedContract, ExerciseByKeyCommand, ExerciseCommand, MinLedgerTime, PrefetchContractKey,
};
pub use completion::{Completion, CompletionStatus, is_successful_completion};
pub use contract::{ActiveContract, ContractEntry, IncompleteReassignment};
pub use error::{ModelError, Result};
pub use event::{
    ArchivedEvent, CreatedEvent, Event, ExercisedEvent, InterfaceView, Transaction,
    TransactionTree, TreeEvent,
};
pub use filter::{CumulativeFilter, Filters, TransactionFilter};
pub use identifier::Identifier;
pub use value::{Enum, GenMap, Int64, Numeric, Record, RecordField, TextMap, Value, Variant};
