//! Representation errors for the ledger data model using snafu.
//!
//! Every error in this module is raised synchronously while constructing or
//! decoding a model value, before any network activity takes place.

use snafu::Snafu;

/// Result type for model construction and decoding.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;

/// A value could not be represented in the ledger data model.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ModelError {
    /// Identifier text did not contain exactly three `:`-separated parts.
    #[snafu(display(
        "invalid identifier '{input}': expected 'packageId:moduleName:entityName'"
    ))]
    InvalidIdentifier {
        /// The offending input string.
        input: String,
    },

    /// One of the identifier parts was empty.
    #[snafu(display("identifier {part} must not be empty"))]
    EmptyIdentifierPart {
        /// Name of the empty part.
        part: &'static str,
    },

    /// Text is not a decimal 64-bit integer.
    #[snafu(display("invalid int64 '{input}': expected a decimal integer in i64 range"))]
    InvalidInt64 {
        /// The offending input string.
        input: String,
    },

    /// Text is not a decimal number.
    #[snafu(display("invalid numeric '{input}': expected [-]digits[.digits]"))]
    InvalidNumeric {
        /// The offending input string.
        input: String,
    },

    /// A text map was given the same key twice.
    #[snafu(display("duplicate text map key '{key}'"))]
    DuplicateMapKey {
        /// The repeated key.
        key: String,
    },

    /// A wire value had no variant populated.
    #[snafu(display("{context} has no variant set"))]
    EmptyValue {
        /// What was being decoded.
        context: &'static str,
    },

    /// A required wire field was absent.
    #[snafu(display("{message}: missing field '{field}'"))]
    MissingField {
        /// What was being decoded.
        message: &'static str,
        /// The absent field.
        field: &'static str,
    },

    /// A ledger offset was negative.
    #[snafu(display("invalid offset {offset}: offsets are non-negative"))]
    InvalidOffset {
        /// The offending offset.
        offset: i64,
    },
}
