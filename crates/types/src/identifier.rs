//! Package/module/entity identifiers naming templates and interfaces.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{EmptyIdentifierPartSnafu, InvalidIdentifierSnafu, ModelError, Result};

/// Separator between identifier parts in the canonical textual form.
const SEPARATOR: char = ':';

/// Fully qualified name of a template or interface.
///
/// The canonical textual form is `packageId:moduleName:entityName`. Module
/// names may themselves contain dots (`Main.Iou`) but never colons.
///
/// ```
/// use daml_ledger_types::Identifier;
///
/// let id: Identifier = "abc123:Main.Iou:Iou".parse().unwrap();
/// assert_eq!(id.module_name(), "Main.Iou");
/// assert_eq!(id.to_string(), "abc123:Main.Iou:Iou");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    package_id: String,
    module_name: String,
    entity_name: String,
}

impl Identifier {
    /// Creates an identifier from its three parts.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyIdentifierPart`] if any part is empty.
    pub fn new(
        package_id: impl Into<String>,
        module_name: impl Into<String>,
        entity_name: impl Into<String>,
    ) -> Result<Self> {
        let package_id = package_id.into();
        let module_name = module_name.into();
        let entity_name = entity_name.into();

        ensure!(!package_id.is_empty(), EmptyIdentifierPartSnafu { part: "package_id" });
        ensure!(!module_name.is_empty(), EmptyIdentifierPartSnafu { part: "module_name" });
        ensure!(!entity_name.is_empty(), EmptyIdentifierPartSnafu { part: "entity_name" });

        Ok(Self { package_id, module_name, entity_name })
    }

    /// Returns the package id (or `#package-name` reference).
    #[must_use]
    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// Returns the dotted module name.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Returns the entity (template or interface) name.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}{SEPARATOR}{}", self.package_id, self.module_name, self.entity_name)
    }
}

impl FromStr for Identifier {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let [package_id, module_name, entity_name] = parts.as_slice() else {
            return InvalidIdentifierSnafu { input: s }.fail();
        };
        Self::new(*package_id, *module_name, *entity_name)
            .map_err(|_| InvalidIdentifierSnafu { input: s }.build())
    }
}

impl TryFrom<String> for Identifier {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use daml_ledger_test_utils::strategies::arb_identifier_text;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_three_parts() {
        let id: Identifier = "pkg:Main.Iou:Iou".parse().unwrap();
        assert_eq!(id.package_id(), "pkg");
        assert_eq!(id.module_name(), "Main.Iou");
        assert_eq!(id.entity_name(), "Iou");
    }

    #[test]
    fn rejects_two_parts_with_input_in_message() {
        let err = "pkg:Iou".parse::<Identifier>().unwrap_err();
        assert_eq!(err, ModelError::InvalidIdentifier { input: "pkg:Iou".to_string() });
        assert!(err.to_string().contains("pkg:Iou"));
    }

    #[test]
    fn rejects_four_parts() {
        let err = "a:b:c:d".parse::<Identifier>().unwrap_err();
        assert!(err.to_string().contains("a:b:c:d"));
    }

    #[test]
    fn rejects_empty_part() {
        assert!("a::c".parse::<Identifier>().is_err());
        assert_eq!(
            Identifier::new("", "M", "E").unwrap_err(),
            ModelError::EmptyIdentifierPart { part: "package_id" }
        );
    }

    #[test]
    fn serde_uses_textual_form() {
        let id = Identifier::new("pkg", "Main", "Asset").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pkg:Main:Asset\"");
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<Identifier>("\"pkg:Main\"").is_err());
    }

    proptest! {
        #[test]
        fn format_parse_round_trip(text in arb_identifier_text()) {
            let id: Identifier = text.parse().unwrap();
            prop_assert_eq!(id.to_string(), text);
        }

        #[test]
        fn wrong_part_count_is_rejected(parts in proptest::collection::vec("[a-z]{1,5}", 1..8)) {
            prop_assume!(parts.len() != 3);
            let text = parts.join(":");
            let err = text.parse::<Identifier>().unwrap_err();
            prop_assert!(err.to_string().contains(&text));
        }
    }
}
