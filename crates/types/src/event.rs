//! Events and the transaction containers that reference them.
//!
//! A flat [`Transaction`] lists created/archived/exercised events in ledger
//! order. A [`TransactionTree`] keeps the full exercise graph: events are
//! indexed by node id and linked parent-to-child through
//! [`ExercisedEvent::child_event_ids`], starting from
//! [`TransactionTree::root_event_ids`].
//!
//! The ledger numbers the nodes of a transaction in pre-order and marks the
//! extent of each exercise with `last_descendant_node_id`. [`TransactionTree::link`]
//! turns those ranges into explicit root and child lists.
//!
//! The tree is expected to be a forest. Traversal does not rely on that: it
//! keeps a visited set so a hand-built graph with cycles or shared children
//! still terminates and yields every reachable event once.

use std::{
    collections::{HashMap, HashSet},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use crate::{Identifier, Value, value::Record};

/// The view an interface computes for a created contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceView {
    /// Interface that produced the view.
    pub interface_id: Identifier,
    /// Status code of the view computation; 0 on success.
    pub view_status_code: i32,
    /// Status message when the view computation failed.
    pub view_status_message: String,
    /// The computed view, present on success.
    pub view_value: Option<Record>,
}

/// A contract was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEvent {
    /// Offset of the enclosing transaction.
    pub offset: i64,
    /// Position of this event within its transaction.
    pub node_id: i32,
    /// Id of the created contract.
    pub contract_id: String,
    /// Template of the created contract.
    pub template_id: Identifier,
    /// Contract arguments, omitted when the filter did not request them.
    pub create_arguments: Option<Record>,
    /// Opaque blob usable for explicit disclosure.
    pub created_event_blob: Vec<u8>,
    /// Interface views requested by the filter.
    pub interface_views: Vec<InterfaceView>,
    /// Parties notified of this event.
    pub witness_parties: Vec<String>,
    /// Signatories of the contract.
    pub signatories: Vec<String>,
    /// Observers of the contract.
    pub observers: Vec<String>,
    /// Contract key, if the template defines one.
    pub contract_key: Option<Value>,
    /// Ledger time at which the contract was created.
    pub created_at: Option<SystemTime>,
    /// Name of the package defining the template.
    pub package_name: String,
}

/// A contract was archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedEvent {
    /// Offset of the enclosing transaction.
    pub offset: i64,
    /// Position of this event within its transaction.
    pub node_id: i32,
    /// Id of the archived contract.
    pub contract_id: String,
    /// Template of the archived contract.
    pub template_id: Identifier,
    /// Parties notified of this event.
    pub witness_parties: Vec<String>,
    /// Name of the package defining the template.
    pub package_name: String,
}

/// A choice was exercised on a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExercisedEvent {
    /// Offset of the enclosing transaction.
    pub offset: i64,
    /// Position of this event within its transaction.
    pub node_id: i32,
    /// Contract the choice was exercised on.
    pub contract_id: String,
    /// Template of that contract.
    pub template_id: Identifier,
    /// Interface the choice was exercised through, if any.
    pub interface_id: Option<Identifier>,
    /// Choice name.
    pub choice: String,
    /// Choice argument.
    pub choice_argument: Value,
    /// Parties that exercised the choice.
    pub acting_parties: Vec<String>,
    /// Whether the exercise archived the contract.
    pub consuming: bool,
    /// Parties notified of this event.
    pub witness_parties: Vec<String>,
    /// Node ids of the visible events this exercise caused, in execution order.
    pub child_event_ids: Vec<i32>,
    /// Node id of the last event in this exercise's subtree.
    pub last_descendant_node_id: i32,
    /// Choice result, if returned.
    pub exercise_result: Option<Value>,
    /// Name of the package defining the template.
    pub package_name: String,
}

/// An event in a flat transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    /// A contract was created.
    Created(CreatedEvent),
    /// A contract was archived.
    Archived(ArchivedEvent),
    /// A choice was exercised.
    Exercised(ExercisedEvent),
}

impl Event {
    /// Returns the node id within the transaction.
    #[must_use]
    pub fn node_id(&self) -> i32 {
        match self {
            Self::Created(e) => e.node_id,
            Self::Archived(e) => e.node_id,
            Self::Exercised(e) => e.node_id,
        }
    }

    /// Returns the contract this event concerns.
    #[must_use]
    pub fn contract_id(&self) -> &str {
        match self {
            Self::Created(e) => &e.contract_id,
            Self::Archived(e) => &e.contract_id,
            Self::Exercised(e) => &e.contract_id,
        }
    }
}

/// An event in a transaction tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeEvent {
    /// A contract was created.
    Created(CreatedEvent),
    /// A choice was exercised.
    Exercised(ExercisedEvent),
}

impl TreeEvent {
    /// Returns the node id within the transaction.
    #[must_use]
    pub fn node_id(&self) -> i32 {
        match self {
            Self::Created(e) => e.node_id,
            Self::Exercised(e) => e.node_id,
        }
    }

    /// Returns the last node id covered by this event's subtree.
    #[must_use]
    pub fn last_descendant_node_id(&self) -> i32 {
        match self {
            Self::Created(e) => e.node_id,
            Self::Exercised(e) => e.last_descendant_node_id.max(e.node_id),
        }
    }

    /// Returns the node ids of direct children; empty for created events.
    #[must_use]
    pub fn child_event_ids(&self) -> &[i32] {
        match self {
            Self::Created(_) => &[],
            Self::Exercised(e) => &e.child_event_ids,
        }
    }

    /// Returns the exercised event, if this is one.
    #[must_use]
    pub fn as_exercised(&self) -> Option<&ExercisedEvent> {
        match self {
            Self::Exercised(e) => Some(e),
            Self::Created(_) => None,
        }
    }

    /// Returns the created event, if this is one.
    #[must_use]
    pub fn as_created(&self) -> Option<&CreatedEvent> {
        match self {
            Self::Created(e) => Some(e),
            Self::Exercised(_) => None,
        }
    }
}

/// A committed transaction as a flat, ordered event list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Id of the update that committed this transaction.
    pub update_id: String,
    /// Command id, visible only to the submitting user.
    pub command_id: String,
    /// Workflow id of the submission.
    pub workflow_id: String,
    /// Ledger effective time.
    pub effective_at: Option<SystemTime>,
    /// Events in ledger order.
    pub events: Vec<Event>,
    /// Offset of the transaction.
    pub offset: i64,
    /// Synchronizer that sequenced the transaction.
    pub synchronizer_id: String,
}

impl Transaction {
    /// Iterates over created events in order.
    pub fn created_events(&self) -> impl Iterator<Item = &CreatedEvent> {
        self.events.iter().filter_map(|e| match e {
            Event::Created(created) => Some(created),
            _ => None,
        })
    }

    /// Iterates over archived events in order.
    pub fn archived_events(&self) -> impl Iterator<Item = &ArchivedEvent> {
        self.events.iter().filter_map(|e| match e {
            Event::Archived(archived) => Some(archived),
            _ => None,
        })
    }
}

/// A committed transaction with its full exercise graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTree {
    /// Id of the update that committed this transaction.
    pub update_id: String,
    /// Command id, visible only to the submitting user.
    pub command_id: String,
    /// Workflow id of the submission.
    pub workflow_id: String,
    /// Ledger effective time.
    pub effective_at: Option<SystemTime>,
    /// Offset of the transaction.
    pub offset: i64,
    /// All visible events keyed by node id.
    pub events_by_id: HashMap<i32, TreeEvent>,
    /// Node ids of the top-level events, in execution order.
    pub root_event_ids: Vec<i32>,
    /// Synchronizer that sequenced the transaction.
    pub synchronizer_id: String,
}

impl TransactionTree {
    /// Derives parent-child links from node-id ranges.
    ///
    /// Fills [`ExercisedEvent::child_event_ids`] of every exercised event and
    /// returns the root node ids. An event is a child of the innermost
    /// exercise whose `node_id..=last_descendant_node_id` range contains it;
    /// events outside every range are roots. Both lists are in ascending
    /// node-id order, which is execution order. Nodes the reader may not see
    /// are absent from the map, so an event whose parent is hidden surfaces as
    /// a root.
    pub fn link(events_by_id: &mut HashMap<i32, TreeEvent>) -> Vec<i32> {
        let mut node_ids: Vec<i32> = events_by_id.keys().copied().collect();
        node_ids.sort_unstable();

        let mut roots = Vec::new();
        let mut edges = Vec::new();
        // Open exercises as (node id, last descendant), innermost last.
        let mut open: Vec<(i32, i32)> = Vec::new();
        for &node_id in &node_ids {
            while open.last().is_some_and(|&(_, last)| node_id > last) {
                open.pop();
            }
            match open.last() {
                Some(&(parent, _)) => edges.push((parent, node_id)),
                None => roots.push(node_id),
            }
            if let Some(TreeEvent::Exercised(exercised)) = events_by_id.get(&node_id) {
                open.push((node_id, exercised.last_descendant_node_id.max(node_id)));
            }
        }

        for event in events_by_id.values_mut() {
            if let TreeEvent::Exercised(exercised) = event {
                exercised.child_event_ids.clear();
            }
        }
        for (parent, child) in edges {
            if let Some(TreeEvent::Exercised(exercised)) = events_by_id.get_mut(&parent) {
                exercised.child_event_ids.push(child);
            }
        }
        roots
    }

    /// Returns the root events in `root_event_ids` order.
    ///
    /// Ids without an entry in `events_by_id` are skipped; non-root events are
    /// never returned even though they share the map.
    #[must_use]
    pub fn root_events(&self) -> Vec<&TreeEvent> {
        self.root_event_ids.iter().filter_map(|id| self.events_by_id.get(id)).collect()
    }

    /// Returns the direct children of an exercised event, skipping dangling ids.
    #[must_use]
    pub fn child_events(&self, parent: &ExercisedEvent) -> Vec<&TreeEvent> {
        parent.child_event_ids.iter().filter_map(|id| self.events_by_id.get(id)).collect()
    }

    /// Visits every event reachable from the roots in depth-first pre-order.
    ///
    /// Each event is visited at most once, after all of its ancestors. Child
    /// ids that are missing from `events_by_id` or were already visited are
    /// skipped, so the walk terminates on cyclic input.
    pub fn walk<'a, F>(&'a self, mut visitor: F)
    where
        F: FnMut(i32, &'a TreeEvent),
    {
        let mut visited: HashSet<i32> = HashSet::with_capacity(self.events_by_id.len());
        let mut stack: Vec<i32> = self.root_event_ids.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                tracing::debug!(node_id = id, "skipping already visited event");
                continue;
            }
            let Some(event) = self.events_by_id.get(&id) else {
                tracing::warn!(node_id = id, update_id = %self.update_id, "dangling event reference");
                continue;
            };

            visitor(id, event);

            stack.extend(
                event.child_event_ids().iter().rev().copied().filter(|child| !visited.contains(child)),
            );
        }
    }

    /// Returns node ids in the order [`walk`](Self::walk) visits them.
    #[must_use]
    pub fn walk_ids(&self) -> Vec<i32> {
        let mut ids = Vec::with_capacity(self.events_by_id.len());
        self.walk(|id, _| ids.push(id));
        ids
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use std::collections::VecDeque;

    use daml_ledger_test_utils::strategies::arb_transaction_tree;
    use proptest::prelude::*;

    use super::*;

    fn template() -> Identifier {
        Identifier::new("pkg", "Main", "Asset").unwrap()
    }

    fn created(id: i32) -> TreeEvent {
        TreeEvent::Created(CreatedEvent {
            offset: 1,
            node_id: id,
            contract_id: format!("cid-{id}"),
            template_id: template(),
            create_arguments: None,
            created_event_blob: Vec::new(),
            interface_views: Vec::new(),
            witness_parties: Vec::new(),
            signatories: vec!["Alice".to_string()],
            observers: Vec::new(),
            contract_key: None,
            created_at: None,
            package_name: "assets".to_string(),
        })
    }

    fn exercised(id: i32, children: &[i32]) -> TreeEvent {
        exercised_until(id, id, children)
    }

    fn exercised_until(id: i32, last_descendant: i32, children: &[i32]) -> TreeEvent {
        TreeEvent::Exercised(ExercisedEvent {
            offset: 1,
            node_id: id,
            contract_id: format!("cid-{id}"),
            template_id: template(),
            interface_id: None,
            choice: "Transfer".to_string(),
            choice_argument: Value::Unit,
            acting_parties: vec!["Alice".to_string()],
            consuming: true,
            witness_parties: Vec::new(),
            child_event_ids: children.to_vec(),
            last_descendant_node_id: last_descendant,
            exercise_result: None,
            package_name: "assets".to_string(),
        })
    }

    fn tree(events: Vec<TreeEvent>, roots: &[i32]) -> TransactionTree {
        TransactionTree {
            update_id: "u1".to_string(),
            command_id: String::new(),
            workflow_id: String::new(),
            effective_at: None,
            offset: 1,
            events_by_id: events.into_iter().map(|e| (e.node_id(), e)).collect(),
            root_event_ids: roots.to_vec(),
            synchronizer_id: "sync".to_string(),
        }
    }

    fn linked(events: Vec<TreeEvent>) -> TransactionTree {
        let mut tree = tree(events, &[]);
        tree.root_event_ids = TransactionTree::link(&mut tree.events_by_id);
        tree
    }

    #[test]
    fn root_events_follow_root_order_and_skip_non_roots() {
        let tree = tree(vec![created(0), created(1), created(2)], &[0, 2]);
        let ids: Vec<i32> = tree.root_events().iter().map(|e| e.node_id()).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn root_events_skip_missing_ids() {
        let tree = tree(vec![created(0)], &[7, 0]);
        assert_eq!(tree.root_events().len(), 1);
    }

    #[test]
    fn walk_is_preorder_depth_first() {
        let tree = tree(
            vec![exercised(0, &[1, 3]), exercised(1, &[2]), created(2), created(3), created(4)],
            &[0, 4],
        );
        assert_eq!(tree.walk_ids(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn walk_terminates_on_cycle_and_visits_once() {
        let tree = tree(vec![exercised(0, &[1]), exercised(1, &[0, 1])], &[0]);
        let mut visits = Vec::new();
        tree.walk(|id, _| visits.push(id));
        assert_eq!(visits, vec![0, 1]);
    }

    #[test]
    fn walk_skips_dangling_children() {
        let tree = tree(vec![exercised(0, &[9, 2]), created(2)], &[0]);
        assert_eq!(tree.walk_ids(), vec![0, 2]);
    }

    #[test]
    fn walk_ignores_unreachable_events() {
        let tree = tree(vec![created(0), created(5)], &[0]);
        assert_eq!(tree.walk_ids(), vec![0]);
    }

    #[test]
    fn child_events_resolve_in_order() {
        let parent = exercised(0, &[2, 1]);
        let tree = tree(vec![parent.clone(), created(1), created(2)], &[0]);
        let children: Vec<i32> =
            tree.child_events(parent.as_exercised().unwrap()).iter().map(|e| e.node_id()).collect();
        assert_eq!(children, vec![2, 1]);
    }

    #[test]
    fn link_derives_nesting_from_descendant_ranges() {
        // 0 exercises 1..=4; 1 exercises 2..=3; 5 is a second root.
        let tree = linked(vec![
            exercised_until(0, 4, &[]),
            exercised_until(1, 3, &[]),
            created(2),
            created(3),
            created(4),
            created(5),
        ]);
        assert_eq!(tree.root_event_ids, vec![0, 5]);
        assert_eq!(tree.events_by_id[&0].child_event_ids(), &[1, 4]);
        assert_eq!(tree.events_by_id[&1].child_event_ids(), &[2, 3]);
        assert_eq!(tree.walk_ids(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn link_promotes_events_under_hidden_parents_to_roots() {
        // Node 0 exercised 1..=3 but is not visible to the reader.
        let tree = linked(vec![created(1), exercised_until(2, 3, &[]), created(3)]);
        assert_eq!(tree.root_event_ids, vec![1, 2]);
        assert_eq!(tree.events_by_id[&2].child_event_ids(), &[3]);
    }

    #[test]
    fn link_skips_hidden_intermediate_nodes() {
        // Node 1 (exercising 2..=3) is hidden; 2 and 3 attach to the visible 0.
        let tree = linked(vec![exercised_until(0, 3, &[]), created(2), created(3)]);
        assert_eq!(tree.root_event_ids, vec![0]);
        assert_eq!(tree.events_by_id[&0].child_event_ids(), &[2, 3]);
    }

    #[test]
    fn link_replaces_stale_child_lists() {
        let tree = linked(vec![exercised_until(0, 0, &[7, 8]), created(1)]);
        assert_eq!(tree.root_event_ids, vec![0, 1]);
        assert!(tree.events_by_id[&0].child_event_ids().is_empty());
    }

    #[test]
    fn transaction_filters_by_event_kind() {
        let TreeEvent::Created(c) = created(0) else { panic!("created") };
        let archived = ArchivedEvent {
            offset: 1,
            node_id: 1,
            contract_id: "cid-0".to_string(),
            template_id: template(),
            witness_parties: Vec::new(),
            package_name: "assets".to_string(),
        };
        let tx = Transaction {
            update_id: "u".to_string(),
            command_id: String::new(),
            workflow_id: String::new(),
            effective_at: None,
            events: vec![Event::Created(c), Event::Archived(archived)],
            offset: 1,
            synchronizer_id: String::new(),
        };
        assert_eq!(tx.created_events().count(), 1);
        assert_eq!(tx.archived_events().next().unwrap().contract_id, "cid-0");
        assert_eq!(tx.events.iter().map(Event::node_id).collect::<Vec<_>>(), vec![0, 1]);
    }

    proptest! {
        #[test]
        fn walk_visits_reachable_events_once_parents_first(tree in arb_transaction_tree()) {
            let order = tree.walk_ids();
            let position: HashMap<i32, usize> =
                order.iter().enumerate().map(|(index, id)| (*id, index)).collect();
            prop_assert_eq!(position.len(), order.len(), "an event was visited twice");

            let mut reachable = HashSet::new();
            let mut queue: VecDeque<i32> = tree.root_event_ids.iter().copied().collect();
            while let Some(id) = queue.pop_front() {
                if let Some(event) = tree.events_by_id.get(&id)
                    && reachable.insert(id)
                {
                    queue.extend(event.child_event_ids().iter().copied());
                }
            }
            let visited: HashSet<i32> = position.keys().copied().collect();
            prop_assert_eq!(&visited, &reachable);
            prop_assert_eq!(visited.len(), tree.events_by_id.len());

            for (parent, event) in &tree.events_by_id {
                for child in event.child_event_ids() {
                    prop_assert!(
                        position[parent] < position[child],
                        "child {} visited before parent {}", child, parent
                    );
                }
            }
        }
    }
}
