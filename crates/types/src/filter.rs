//! Event filters selecting which contracts and events a party sees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Identifier;

/// A single filter clause; clauses within [`Filters`] are cumulative (OR).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CumulativeFilter {
    /// Every template visible to the party.
    Wildcard {
        /// Include the created-event blob for disclosure.
        include_created_event_blob: bool,
    },
    /// Contracts of one template.
    Template {
        /// The template.
        template_id: Identifier,
        /// Include the created-event blob for disclosure.
        include_created_event_blob: bool,
    },
    /// Contracts implementing one interface.
    Interface {
        /// The interface.
        interface_id: Identifier,
        /// Include the interface view in created events.
        include_interface_view: bool,
        /// Include the created-event blob for disclosure.
        include_created_event_blob: bool,
    },
}

impl CumulativeFilter {
    /// Matches a template without the created-event blob.
    #[must_use]
    pub fn template(template_id: Identifier) -> Self {
        Self::Template { template_id, include_created_event_blob: false }
    }

    /// Matches an interface and includes its view.
    #[must_use]
    pub fn interface(interface_id: Identifier) -> Self {
        Self::Interface {
            interface_id,
            include_interface_view: true,
            include_created_event_blob: false,
        }
    }

    /// Matches everything without the created-event blob.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::Wildcard { include_created_event_blob: false }
    }
}

/// The clauses applied to one party.
///
/// An empty clause list is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Clauses combined by union.
    pub cumulative: Vec<CumulativeFilter>,
}

impl Filters {
    /// Creates filters from clauses.
    #[must_use]
    pub fn new(cumulative: Vec<CumulativeFilter>) -> Self {
        Self { cumulative }
    }
}

/// Per-party filters for transaction and active-contract queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Filters keyed by party.
    pub filters_by_party: BTreeMap<String, Filters>,
    /// Filters applied to every party the participant hosts.
    pub filters_for_any_party: Option<Filters>,
}

impl TransactionFilter {
    /// Creates an empty filter that matches no party.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a wildcard filter for each party.
    pub fn wildcard_for<I, S>(parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        parties.into_iter().fold(Self::new(), |filter, party| {
            filter.with_party(party, Filters::new(vec![CumulativeFilter::wildcard()]))
        })
    }

    /// Sets the filters for one party.
    #[must_use]
    pub fn with_party(mut self, party: impl Into<String>, filters: Filters) -> Self {
        self.filters_by_party.insert(party.into(), filters);
        self
    }

    /// Sets the filters applied to any party.
    #[must_use]
    pub fn with_any_party(mut self, filters: Filters) -> Self {
        self.filters_for_any_party = Some(filters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_for_each_party() {
        let filter = TransactionFilter::wildcard_for(["Alice", "Bob"]);
        assert_eq!(filter.filters_by_party.len(), 2);
        assert_eq!(
            filter.filters_by_party["Bob"].cumulative,
            vec![CumulativeFilter::Wildcard { include_created_event_blob: false }]
        );
        assert!(filter.filters_for_any_party.is_none());
    }
}
