//! Conversions between the ledger data model and its wire messages.
//!
//! Domain-to-wire is total and infallible ([`From`]); wire-to-domain is
//! fallible ([`TryFrom`]) because the wire leaves every message field
//! optional and cannot rule out negative offsets or repeated map keys.
//!
//! Decimals never pass through a binary numeric type: the text of
//! [`Numeric`] is copied verbatim in both directions. `int64` values travel
//! as zigzag varints and timestamps as fixed 64-bit microseconds.
//!
//! Transaction trees arrive keyed by node id with exercise extents given by
//! `last_descendant_node_id`; decoding derives the root and child lists with
//! [`TransactionTree::link`].

use std::time::{Duration, SystemTime};

use daml_ledger_types::{
    ActiveContract, ArchivedEvent, Command, Commands, Completion, CompletionStatus, ContractEntry,
    CreateAndExerciseCommand, CreateCommand, CreatedEvent, CumulativeFilter, DeduplicationPeriod,
    DisclosedContract, Enum, Event, ExerciseByKeyCommand, ExerciseCommand, ExercisedEvent,
    Filters, GenMap, Identifier, IncompleteReassignment, Int64, InterfaceView, MinLedgerTime,
    ModelError, Numeric, PrefetchContractKey, Record, RecordField, TextMap, Transaction,
    TransactionFilter, TransactionTree, TreeEvent, Value, Variant,
    error::{EmptyValueSnafu, InvalidOffsetSnafu, MissingFieldSnafu},
};
use snafu::{OptionExt, ensure};

use crate::proto;

/// Result type for wire decoding.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;

/// Validates an offset read from the wire.
///
/// Offsets are non-negative; 0 denotes the ledger begin, which is also what
/// an unset field decodes to.
///
/// # Errors
///
/// Returns [`ModelError::InvalidOffset`] for negative offsets.
pub fn parse_offset(offset: i64) -> Result<i64> {
    ensure!(offset >= 0, InvalidOffsetSnafu { offset });
    Ok(offset)
}

fn to_proto_duration(duration: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        nanos: duration.subsec_nanos() as i32,
    }
}

fn from_proto_timestamp(ts: Option<prost_types::Timestamp>) -> Option<SystemTime> {
    ts.and_then(|ts| SystemTime::try_from(ts).ok())
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn required<T>(field: Option<T>, message: &'static str, name: &'static str) -> Result<T> {
    field.context(MissingFieldSnafu { message, field: name })
}

fn required_identifier(
    field: Option<proto::Identifier>,
    message: &'static str,
    name: &'static str,
) -> Result<Identifier> {
    Identifier::try_from(required(field, message, name)?)
}

fn optional_identifier(field: Option<proto::Identifier>) -> Result<Option<Identifier>> {
    field.map(Identifier::try_from).transpose()
}

// =============================================================================
// Identifier and Value
// =============================================================================

impl From<&Identifier> for proto::Identifier {
    fn from(id: &Identifier) -> Self {
        Self {
            package_id: id.package_id().to_string(),
            module_name: id.module_name().to_string(),
            entity_name: id.entity_name().to_string(),
        }
    }
}

impl TryFrom<proto::Identifier> for Identifier {
    type Error = ModelError;

    fn try_from(proto: proto::Identifier) -> Result<Self> {
        Identifier::new(proto.package_id, proto.module_name, proto.entity_name)
    }
}

impl From<&Value> for proto::Value {
    fn from(value: &Value) -> Self {
        use proto::value::Sum;

        let sum = match value {
            Value::Record(record) => Sum::Record(record.into()),
            Value::Variant(variant) => Sum::Variant(Box::new(proto::Variant {
                variant_id: variant.variant_id.as_ref().map(Into::into),
                constructor: variant.constructor.clone(),
                value: Some(Box::new(variant.value.as_ref().into())),
            })),
            Value::Enum(e) => Sum::Enum(proto::Enum {
                enum_id: e.enum_id.as_ref().map(Into::into),
                constructor: e.constructor.clone(),
            }),
            Value::ContractId(id) => Sum::ContractId(id.clone()),
            Value::List(elements) => {
                Sum::List(proto::List { elements: elements.iter().map(Into::into).collect() })
            },
            Value::Int64(i) => Sum::Int64(i.value()),
            Value::Numeric(n) => Sum::Numeric(n.as_str().to_string()),
            Value::Text(t) => Sum::Text(t.clone()),
            Value::Timestamp(micros) => Sum::Timestamp(*micros),
            Value::Party(p) => Sum::Party(p.clone()),
            Value::Bool(b) => Sum::Bool(*b),
            Value::Unit => Sum::Unit(()),
            Value::Date(d) => Sum::Date(*d),
            Value::Optional(inner) => Sum::Optional(Box::new(proto::Optional {
                value: inner.as_deref().map(|v| Box::new(v.into())),
            })),
            Value::TextMap(map) => Sum::TextMap(proto::TextMap {
                entries: map
                    .iter()
                    .map(|(key, value)| proto::text_map::Entry {
                        key: key.to_string(),
                        value: Some(value.into()),
                    })
                    .collect(),
            }),
            Value::GenMap(map) => Sum::GenMap(proto::GenMap {
                entries: map
                    .iter()
                    .map(|(key, value)| proto::gen_map::Entry {
                        key: Some(key.into()),
                        value: Some(value.into()),
                    })
                    .collect(),
            }),
        };
        Self { sum: Some(sum) }
    }
}

impl From<&Record> for proto::Record {
    fn from(record: &Record) -> Self {
        Self {
            record_id: record.record_id.as_ref().map(Into::into),
            fields: record
                .fields
                .iter()
                .map(|field| proto::RecordField {
                    // Positional fields have no label on the wire.
                    label: field.label.clone().unwrap_or_default(),
                    value: Some((&field.value).into()),
                })
                .collect(),
        }
    }
}

impl TryFrom<proto::Value> for Value {
    type Error = ModelError;

    fn try_from(proto: proto::Value) -> Result<Self> {
        use proto::value::Sum;

        let sum = proto.sum.context(EmptyValueSnafu { context: "Value" })?;
        Ok(match sum {
            Sum::Unit(()) => Value::Unit,
            Sum::Bool(b) => Value::Bool(b),
            Sum::Int64(n) => Value::Int64(Int64::from(n)),
            Sum::Date(d) => Value::Date(d),
            Sum::Timestamp(micros) => Value::Timestamp(micros),
            Sum::Numeric(text) => Value::Numeric(Numeric::new(text)?),
            Sum::Party(p) => Value::Party(p),
            Sum::Text(t) => Value::Text(t),
            Sum::ContractId(id) => Value::ContractId(id),
            Sum::Optional(opt) => {
                Value::Optional(opt.value.map(|v| Value::try_from(*v).map(Box::new)).transpose()?)
            },
            Sum::List(list) => Value::List(
                list.elements.into_iter().map(Value::try_from).collect::<Result<Vec<_>>>()?,
            ),
            Sum::TextMap(map) => {
                let entries = map
                    .entries
                    .into_iter()
                    .map(|entry| {
                        let value = required(entry.value, "TextMap.Entry", "value")?;
                        Ok((entry.key, Value::try_from(value)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::TextMap(TextMap::new(entries)?)
            },
            Sum::GenMap(map) => {
                let entries = map
                    .entries
                    .into_iter()
                    .map(|entry| {
                        let key = required(entry.key, "GenMap.Entry", "key")?;
                        let value = required(entry.value, "GenMap.Entry", "value")?;
                        Ok((Value::try_from(key)?, Value::try_from(value)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::GenMap(GenMap::new(entries))
            },
            Sum::Record(record) => Value::Record(record.try_into()?),
            Sum::Variant(variant) => {
                let variant = *variant;
                let inner = required(variant.value, "Variant", "value")?;
                Value::Variant(Variant {
                    variant_id: optional_identifier(variant.variant_id)?,
                    constructor: variant.constructor,
                    value: Box::new(Value::try_from(*inner)?),
                })
            },
            Sum::Enum(e) => Value::Enum(Enum {
                enum_id: optional_identifier(e.enum_id)?,
                constructor: e.constructor,
            }),
        })
    }
}

impl TryFrom<proto::Record> for Record {
    type Error = ModelError;

    fn try_from(proto: proto::Record) -> Result<Self> {
        let fields = proto
            .fields
            .into_iter()
            .map(|field| {
                let value = required(field.value, "RecordField", "value")?;
                Ok(RecordField { label: non_empty(field.label), value: Value::try_from(value)? })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Record { record_id: optional_identifier(proto.record_id)?, fields })
    }
}

// =============================================================================
// Commands
// =============================================================================

impl From<&Command> for proto::Command {
    fn from(command: &Command) -> Self {
        use proto::command::Command as Wire;

        let wire = match command {
            Command::Create(c) => Wire::Create(proto::CreateCommand {
                template_id: Some((&c.template_id).into()),
                create_arguments: Some((&c.create_arguments).into()),
            }),
            Command::Exercise(c) => Wire::Exercise(proto::ExerciseCommand {
                template_id: Some((&c.template_id).into()),
                contract_id: c.contract_id.clone(),
                choice: c.choice.clone(),
                choice_argument: Some((&c.choice_argument).into()),
            }),
            Command::ExerciseByKey(c) => Wire::ExerciseByKey(proto::ExerciseByKeyCommand {
                template_id: Some((&c.template_id).into()),
                contract_key: Some((&c.contract_key).into()),
                choice: c.choice.clone(),
                choice_argument: Some((&c.choice_argument).into()),
            }),
            Command::CreateAndExercise(c) => {
                Wire::CreateAndExercise(proto::CreateAndExerciseCommand {
                    template_id: Some((&c.template_id).into()),
                    create_arguments: Some((&c.create_arguments).into()),
                    choice: c.choice.clone(),
                    choice_argument: Some((&c.choice_argument).into()),
                })
            },
        };
        Self { command: Some(wire) }
    }
}

impl TryFrom<proto::Command> for Command {
    type Error = ModelError;

    fn try_from(proto: proto::Command) -> Result<Self> {
        use proto::command::Command as Wire;

        let wire = proto.command.context(EmptyValueSnafu { context: "Command" })?;
        Ok(match wire {
            Wire::Create(c) => Command::Create(CreateCommand {
                template_id: required_identifier(c.template_id, "CreateCommand", "template_id")?,
                create_arguments: required(c.create_arguments, "CreateCommand", "create_arguments")?
                    .try_into()?,
            }),
            Wire::Exercise(c) => Command::Exercise(ExerciseCommand {
                template_id: required_identifier(c.template_id, "ExerciseCommand", "template_id")?,
                contract_id: c.contract_id,
                choice: c.choice,
                choice_argument: required(c.choice_argument, "ExerciseCommand", "choice_argument")?
                    .try_into()?,
            }),
            Wire::ExerciseByKey(c) => Command::ExerciseByKey(ExerciseByKeyCommand {
                template_id: required_identifier(
                    c.template_id,
                    "ExerciseByKeyCommand",
                    "template_id",
                )?,
                contract_key: required(c.contract_key, "ExerciseByKeyCommand", "contract_key")?
                    .try_into()?,
                choice: c.choice,
                choice_argument: required(
                    c.choice_argument,
                    "ExerciseByKeyCommand",
                    "choice_argument",
                )?
                .try_into()?,
            }),
            Wire::CreateAndExercise(c) => Command::CreateAndExercise(CreateAndExerciseCommand {
                template_id: required_identifier(
                    c.template_id,
                    "CreateAndExerciseCommand",
                    "template_id",
                )?,
                create_arguments: required(
                    c.create_arguments,
                    "CreateAndExerciseCommand",
                    "create_arguments",
                )?
                .try_into()?,
                choice: c.choice,
                choice_argument: required(
                    c.choice_argument,
                    "CreateAndExerciseCommand",
                    "choice_argument",
                )?
                .try_into()?,
            }),
        })
    }
}

impl From<&DisclosedContract> for proto::DisclosedContract {
    fn from(contract: &DisclosedContract) -> Self {
        Self {
            template_id: Some((&contract.template_id).into()),
            contract_id: contract.contract_id.clone(),
            created_event_blob: contract.created_event_blob.clone(),
            synchronizer_id: contract.synchronizer_id.clone().unwrap_or_default(),
        }
    }
}

impl From<&PrefetchContractKey> for proto::PrefetchContractKey {
    fn from(key: &PrefetchContractKey) -> Self {
        Self {
            template_id: Some((&key.template_id).into()),
            contract_key: Some((&key.contract_key).into()),
        }
    }
}

impl From<&Commands> for proto::Commands {
    fn from(commands: &Commands) -> Self {
        use proto::commands::DeduplicationPeriod as Wire;

        let deduplication_period = commands.deduplication_period.as_ref().map(|period| match period
        {
            DeduplicationPeriod::Duration(d) => Wire::DeduplicationDuration(to_proto_duration(*d)),
            DeduplicationPeriod::Offset(o) => Wire::DeduplicationOffset(*o),
        });
        let (min_ledger_time_abs, min_ledger_time_rel) = match &commands.min_ledger_time {
            Some(MinLedgerTime::Absolute(at)) => (Some((*at).into()), None),
            Some(MinLedgerTime::Relative(after)) => (None, Some(to_proto_duration(*after))),
            None => (None, None),
        };

        // Unset text fields stay empty, which proto3 leaves off the wire.
        Self {
            workflow_id: commands.workflow_id.clone().unwrap_or_default(),
            user_id: commands.user_id.clone().unwrap_or_default(),
            command_id: commands.command_id.clone().unwrap_or_default(),
            commands: commands.commands.iter().map(Into::into).collect(),
            min_ledger_time_abs,
            min_ledger_time_rel,
            act_as: commands.act_as.clone(),
            read_as: commands.read_as.clone(),
            submission_id: commands.submission_id.clone().unwrap_or_default(),
            disclosed_contracts: commands.disclosed_contracts.iter().map(Into::into).collect(),
            synchronizer_id: commands.synchronizer_id.clone().unwrap_or_default(),
            package_id_selection_preference: commands.package_id_selection_preference.clone(),
            prefetch_contract_keys: commands.prefetch_contract_keys.iter().map(Into::into).collect(),
            deduplication_period,
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

impl From<&CumulativeFilter> for proto::CumulativeFilter {
    fn from(filter: &CumulativeFilter) -> Self {
        use proto::cumulative_filter::IdentifierFilter;

        let identifier_filter = match filter {
            CumulativeFilter::Wildcard { include_created_event_blob } => {
                IdentifierFilter::WildcardFilter(proto::WildcardFilter {
                    include_created_event_blob: *include_created_event_blob,
                })
            },
            CumulativeFilter::Template { template_id, include_created_event_blob } => {
                IdentifierFilter::TemplateFilter(proto::TemplateFilter {
                    template_id: Some(template_id.into()),
                    include_created_event_blob: *include_created_event_blob,
                })
            },
            CumulativeFilter::Interface {
                interface_id,
                include_interface_view,
                include_created_event_blob,
            } => IdentifierFilter::InterfaceFilter(proto::InterfaceFilter {
                interface_id: Some(interface_id.into()),
                include_interface_view: *include_interface_view,
                include_created_event_blob: *include_created_event_blob,
            }),
        };
        Self { identifier_filter: Some(identifier_filter) }
    }
}

impl From<&Filters> for proto::Filters {
    fn from(filters: &Filters) -> Self {
        Self { cumulative: filters.cumulative.iter().map(Into::into).collect() }
    }
}

/// Builds the event format that selects `filter`'s events.
///
/// `verbose` asks the ledger for labelled record fields and type ids.
#[must_use]
pub fn event_format(filter: &TransactionFilter, verbose: bool) -> proto::EventFormat {
    proto::EventFormat {
        filters_by_party: filter
            .filters_by_party
            .iter()
            .map(|(party, filters)| (party.clone(), filters.into()))
            .collect(),
        filters_for_any_party: filter.filters_for_any_party.as_ref().map(Into::into),
        verbose,
    }
}

/// Builds a transaction format with the ACS-delta shape: created and
/// archived events only, as in a flat [`Transaction`].
#[must_use]
pub fn transaction_format(filter: &TransactionFilter, verbose: bool) -> proto::TransactionFormat {
    proto::TransactionFormat {
        event_format: Some(event_format(filter, verbose)),
        transaction_shape: proto::TransactionShape::AcsDelta as i32,
    }
}

// =============================================================================
// Events and transactions
// =============================================================================

impl TryFrom<proto::InterfaceView> for InterfaceView {
    type Error = ModelError;

    fn try_from(proto: proto::InterfaceView) -> Result<Self> {
        let (view_status_code, view_status_message) =
            proto.view_status.map_or((0, String::new()), |s| (s.code, s.message));
        Ok(Self {
            interface_id: required_identifier(proto.interface_id, "InterfaceView", "interface_id")?,
            view_status_code,
            view_status_message,
            view_value: proto.view_value.map(Record::try_from).transpose()?,
        })
    }
}

impl TryFrom<proto::CreatedEvent> for CreatedEvent {
    type Error = ModelError;

    fn try_from(proto: proto::CreatedEvent) -> Result<Self> {
        Ok(Self {
            offset: parse_offset(proto.offset)?,
            node_id: proto.node_id,
            contract_id: proto.contract_id,
            template_id: required_identifier(proto.template_id, "CreatedEvent", "template_id")?,
            create_arguments: proto.create_arguments.map(Record::try_from).transpose()?,
            created_event_blob: proto.created_event_blob,
            interface_views: proto
                .interface_views
                .into_iter()
                .map(InterfaceView::try_from)
                .collect::<Result<_>>()?,
            witness_parties: proto.witness_parties,
            signatories: proto.signatories,
            observers: proto.observers,
            contract_key: proto.contract_key.map(Value::try_from).transpose()?,
            created_at: from_proto_timestamp(proto.created_at),
            package_name: proto.package_name,
        })
    }
}

impl TryFrom<proto::ArchivedEvent> for ArchivedEvent {
    type Error = ModelError;

    fn try_from(proto: proto::ArchivedEvent) -> Result<Self> {
        Ok(Self {
            offset: parse_offset(proto.offset)?,
            node_id: proto.node_id,
            contract_id: proto.contract_id,
            template_id: required_identifier(proto.template_id, "ArchivedEvent", "template_id")?,
            witness_parties: proto.witness_parties,
            package_name: proto.package_name,
        })
    }
}

impl TryFrom<proto::ExercisedEvent> for ExercisedEvent {
    type Error = ModelError;

    /// Child links are left empty; [`TransactionTree`] decoding fills them.
    fn try_from(proto: proto::ExercisedEvent) -> Result<Self> {
        Ok(Self {
            offset: parse_offset(proto.offset)?,
            node_id: proto.node_id,
            contract_id: proto.contract_id,
            template_id: required_identifier(proto.template_id, "ExercisedEvent", "template_id")?,
            interface_id: optional_identifier(proto.interface_id)?,
            choice: proto.choice,
            choice_argument: required(proto.choice_argument, "ExercisedEvent", "choice_argument")?
                .try_into()?,
            acting_parties: proto.acting_parties,
            consuming: proto.consuming,
            witness_parties: proto.witness_parties,
            child_event_ids: Vec::new(),
            last_descendant_node_id: proto.last_descendant_node_id,
            exercise_result: proto.exercise_result.map(Value::try_from).transpose()?,
            package_name: proto.package_name,
        })
    }
}

impl TryFrom<proto::Event> for Event {
    type Error = ModelError;

    fn try_from(proto: proto::Event) -> Result<Self> {
        use proto::event::Event as Wire;

        Ok(match proto.event.context(EmptyValueSnafu { context: "Event" })? {
            Wire::Created(e) => Event::Created(e.try_into()?),
            Wire::Archived(e) => Event::Archived(e.try_into()?),
            Wire::Exercised(e) => Event::Exercised(e.try_into()?),
        })
    }
}

impl TryFrom<proto::TreeEvent> for TreeEvent {
    type Error = ModelError;

    fn try_from(proto: proto::TreeEvent) -> Result<Self> {
        use proto::tree_event::Kind;

        Ok(match proto.kind.context(EmptyValueSnafu { context: "TreeEvent" })? {
            Kind::Created(e) => TreeEvent::Created(e.try_into()?),
            Kind::Exercised(e) => TreeEvent::Exercised(e.try_into()?),
        })
    }
}

impl TryFrom<proto::Transaction> for Transaction {
    type Error = ModelError;

    fn try_from(proto: proto::Transaction) -> Result<Self> {
        Ok(Self {
            update_id: proto.update_id,
            command_id: proto.command_id,
            workflow_id: proto.workflow_id,
            effective_at: from_proto_timestamp(proto.effective_at),
            events: proto.events.into_iter().map(Event::try_from).collect::<Result<_>>()?,
            offset: parse_offset(proto.offset)?,
            synchronizer_id: proto.synchronizer_id,
        })
    }
}

impl TryFrom<proto::TransactionTree> for TransactionTree {
    type Error = ModelError;

    fn try_from(proto: proto::TransactionTree) -> Result<Self> {
        let mut events_by_id = proto
            .events_by_id
            .into_iter()
            .map(|(id, event)| Ok((id, TreeEvent::try_from(event)?)))
            .collect::<Result<_>>()?;
        let root_event_ids = TransactionTree::link(&mut events_by_id);
        Ok(Self {
            update_id: proto.update_id,
            command_id: proto.command_id,
            workflow_id: proto.workflow_id,
            effective_at: from_proto_timestamp(proto.effective_at),
            offset: parse_offset(proto.offset)?,
            events_by_id,
            root_event_ids,
            synchronizer_id: proto.synchronizer_id,
        })
    }
}

// =============================================================================
// Completions and contract entries
// =============================================================================

impl TryFrom<proto::Completion> for Completion {
    type Error = ModelError;

    fn try_from(proto: proto::Completion) -> Result<Self> {
        Ok(Self {
            command_id: proto.command_id,
            status: proto
                .status
                .map(|status| CompletionStatus { code: status.code, message: status.message }),
            update_id: non_empty(proto.update_id),
            submission_id: non_empty(proto.submission_id),
            act_as: proto.act_as,
            offset: parse_offset(proto.offset)?,
            synchronizer_id: proto
                .synchronizer_time
                .map(|time| time.synchronizer_id)
                .unwrap_or_default(),
        })
    }
}

impl TryFrom<proto::IncompleteUnassigned> for IncompleteReassignment {
    type Error = ModelError;

    fn try_from(proto: proto::IncompleteUnassigned) -> Result<Self> {
        let unassigned =
            required(proto.unassigned_event, "IncompleteUnassigned", "unassigned_event")?;
        Ok(Self {
            created_event: required(proto.created_event, "IncompleteUnassigned", "created_event")?
                .try_into()?,
            reassignment_id: unassigned.reassignment_id,
            source: unassigned.source,
            target: unassigned.target,
        })
    }
}

impl TryFrom<proto::IncompleteAssigned> for IncompleteReassignment {
    type Error = ModelError;

    fn try_from(proto: proto::IncompleteAssigned) -> Result<Self> {
        let assigned = required(proto.assigned_event, "IncompleteAssigned", "assigned_event")?;
        Ok(Self {
            created_event: required(assigned.created_event, "AssignedEvent", "created_event")?
                .try_into()?,
            reassignment_id: assigned.reassignment_id,
            source: assigned.source,
            target: assigned.target,
        })
    }
}

impl TryFrom<proto::get_active_contracts_response::ContractEntry> for ContractEntry {
    type Error = ModelError;

    fn try_from(proto: proto::get_active_contracts_response::ContractEntry) -> Result<Self> {
        use proto::get_active_contracts_response::ContractEntry as Wire;

        Ok(match proto {
            Wire::ActiveContract(active) => ContractEntry::Active(ActiveContract {
                created_event: required(active.created_event, "ActiveContract", "created_event")?
                    .try_into()?,
                synchronizer_id: active.synchronizer_id,
                reassignment_counter: active.reassignment_counter,
            }),
            Wire::IncompleteUnassigned(r) => ContractEntry::IncompleteUnassigned(r.try_into()?),
            Wire::IncompleteAssigned(r) => ContractEntry::IncompleteAssigned(r.try_into()?),
        })
    }
}
