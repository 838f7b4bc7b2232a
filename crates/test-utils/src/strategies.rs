//! Proptest strategies for ledger model types.
//!
//! Strategies produce well-formed values: identifiers with three non-empty
//! parts, value trees with unique text-map keys and bounded depth, and
//! transaction trees that form a forest.
//!
//! # Usage
//!
//! ```no_run
//! use daml_ledger_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(value in strategies::arb_value()) {
//!         // test invariant with a randomly generated value tree
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use daml_ledger_types::{
    CreatedEvent, Enum, ExercisedEvent, GenMap, Identifier, Int64, Numeric, Record, RecordField,
    TextMap, TransactionTree, TreeEvent, Value, Variant,
};
use proptest::prelude::*;

/// Generates identifier text `pkg:Module.Path:Entity` with exactly two colons.
pub fn arb_identifier_text() -> impl Strategy<Value = String> {
    ("[a-f0-9]{1,16}", "[A-Z][a-zA-Z]{0,6}(\\.[A-Z][a-zA-Z]{0,6}){0,2}", "[A-Z][a-zA-Z0-9_]{0,10}")
        .prop_map(|(package, module, entity)| format!("{package}:{module}:{entity}"))
}

/// Generates a valid [`Identifier`].
pub fn arb_identifier() -> impl Strategy<Value = Identifier> {
    arb_identifier_text().prop_filter_map("valid identifier", |text| text.parse().ok())
}

/// Generates a party name.
pub fn arb_party() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{1,8}::[a-f0-9]{4,8}"
}

fn arb_leaf_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| Value::Int64(Int64::from(n))),
        ("-?[0-9]{1,28}", proptest::option::of("[0-9]{1,10}")).prop_map(|(whole, frac)| {
            let text = match frac {
                Some(frac) => format!("{whole}.{frac}"),
                None => whole,
            };
            Numeric::new(text).map_or(Value::Unit, Value::Numeric)
        }),
        "[ -~]{0,16}".prop_map(Value::Text),
        "[0-9:#a-f]{1,16}".prop_map(Value::ContractId),
        arb_party().prop_map(Value::Party),
        (-62_135_596_800_000_000i64..253_402_300_800_000_000).prop_map(Value::Timestamp),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Unit),
        any::<i32>().prop_map(Value::Date),
        ("[A-Z][a-z]{0,6}", proptest::option::of(arb_identifier()))
            .prop_map(|(constructor, enum_id)| Value::Enum(Enum { enum_id, constructor })),
    ]
}

/// Generates a value tree up to four levels deep.
pub fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf_value().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            inner.clone().prop_map(|v| Value::Optional(Some(Box::new(v)))),
            (
                proptest::option::of(arb_identifier()),
                proptest::collection::vec((proptest::option::of("[a-z]{1,8}"), inner.clone()), 0..5),
            )
                .prop_map(|(record_id, fields)| {
                    Value::Record(Record {
                        record_id,
                        fields: fields
                            .into_iter()
                            .map(|(label, value)| RecordField { label, value })
                            .collect(),
                    })
                }),
            ("[A-Z][a-z]{0,6}", inner.clone()).prop_map(|(constructor, value)| {
                Value::Variant(Variant::new(constructor, value))
            }),
            proptest::collection::btree_map("[a-z]{1,6}", inner.clone(), 0..4).prop_map(
                |entries: BTreeMap<String, Value>| {
                    TextMap::new(entries).map_or(Value::Unit, Value::TextMap)
                }
            ),
            proptest::collection::vec((inner.clone(), inner), 0..4)
                .prop_map(|entries| Value::GenMap(GenMap::new(entries))),
        ]
    })
}

fn created_event(node_id: i32, template_id: Identifier) -> TreeEvent {
    TreeEvent::Created(CreatedEvent {
        offset: 1,
        node_id,
        contract_id: format!("cid-{node_id}"),
        template_id,
        create_arguments: None,
        created_event_blob: Vec::new(),
        interface_views: Vec::new(),
        witness_parties: Vec::new(),
        signatories: Vec::new(),
        observers: Vec::new(),
        contract_key: None,
        created_at: None,
        package_name: "generated".to_string(),
    })
}

fn exercised_event(
    node_id: i32,
    last_descendant_node_id: i32,
    template_id: Identifier,
    child_event_ids: Vec<i32>,
) -> TreeEvent {
    TreeEvent::Exercised(ExercisedEvent {
        offset: 1,
        node_id,
        contract_id: format!("cid-{node_id}"),
        template_id,
        interface_id: None,
        choice: "Step".to_string(),
        choice_argument: Value::Unit,
        acting_parties: Vec::new(),
        consuming: false,
        witness_parties: Vec::new(),
        child_event_ids,
        last_descendant_node_id,
        exercise_result: None,
        package_name: "generated".to_string(),
    })
}

/// Assigns pre-order node ids to the subtree under `index`.
fn number_preorder(
    index: usize,
    children: &[Vec<usize>],
    next: &mut i32,
    node_ids: &mut [i32],
    last_descendants: &mut [i32],
) {
    node_ids[index] = *next;
    *next += 1;
    for &child in &children[index] {
        number_preorder(child, children, next, node_ids, last_descendants);
    }
    last_descendants[index] = *next - 1;
}

/// Generates a transaction tree that forms a forest.
///
/// Event `i` (for `i > 0`) picks a parent among events `0..i`, or becomes a
/// root. Parents that received children are exercised events, the rest are
/// created events, so every id is reachable exactly once from the roots.
/// Node ids are assigned in pre-order with `last_descendant_node_id` set the
/// way the ledger sets it, and child and root lists are in node-id order.
pub fn arb_transaction_tree() -> impl Strategy<Value = TransactionTree> {
    (1usize..24)
        .prop_flat_map(|size| {
            let parents: Vec<BoxedStrategy<Option<usize>>> = (0..size)
                .map(|i| {
                    if i == 0 {
                        Just(None).boxed()
                    } else {
                        proptest::option::weighted(0.8, 0..i).boxed()
                    }
                })
                .collect();
            (parents, arb_identifier())
        })
        .prop_map(|(parents, template_id)| {
            let size = parents.len();
            let mut children: Vec<Vec<usize>> = vec![Vec::new(); size];
            let mut roots = Vec::new();
            for (i, parent) in parents.iter().enumerate() {
                match parent {
                    Some(p) => children[*p].push(i),
                    None => roots.push(i),
                }
            }

            let mut node_ids = vec![0; size];
            let mut last_descendants = vec![0; size];
            let mut next = 0;
            for &root in &roots {
                number_preorder(root, &children, &mut next, &mut node_ids, &mut last_descendants);
            }

            let events_by_id: HashMap<i32, TreeEvent> = children
                .iter()
                .enumerate()
                .map(|(i, kids)| {
                    let node_id = node_ids[i];
                    let event = if kids.is_empty() {
                        created_event(node_id, template_id.clone())
                    } else {
                        let child_ids = kids.iter().map(|&kid| node_ids[kid]).collect();
                        exercised_event(node_id, last_descendants[i], template_id.clone(), child_ids)
                    };
                    (node_id, event)
                })
                .collect();

            TransactionTree {
                update_id: "generated".to_string(),
                command_id: String::new(),
                workflow_id: String::new(),
                effective_at: None,
                offset: 1,
                events_by_id,
                root_event_ids: roots.iter().map(|&root| node_ids[root]).collect(),
                synchronizer_id: "sync".to_string(),
            }
        })
}
