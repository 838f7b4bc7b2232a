//! The ledger's recursive value model.
//!
//! A [`Value`] is a strict tree: container variants own their children, so
//! sharing and cycles cannot be expressed. Exactly one variant is populated
//! at a time by construction; the all-absent case only exists on the wire and
//! is rejected when decoding.
//!
//! Decimals are carried as validated text ([`Numeric`]) so values outside the
//! range of a binary float never lose precision. [`Int64`] holds a native
//! `i64` and serializes as decimal text for the same reason.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::{
    Identifier,
    error::{DuplicateMapKeySnafu, InvalidInt64Snafu, InvalidNumericSnafu, Result},
};

/// Any ledger-level value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    /// A record with optional field labels.
    Record(Record),
    /// A variant constructor applied to a value.
    Variant(Variant),
    /// An enum constructor.
    Enum(Enum),
    /// A contract id.
    ContractId(String),
    /// An ordered list.
    List(Vec<Value>),
    /// A 64-bit signed integer.
    Int64(Int64),
    /// A fixed-point decimal in text form.
    Numeric(Numeric),
    /// A text string.
    Text(String),
    /// Microseconds since the Unix epoch, UTC.
    Timestamp(i64),
    /// A party identifier.
    Party(String),
    /// A boolean.
    Bool(bool),
    /// The unit value.
    Unit,
    /// Days since the Unix epoch.
    Date(i32),
    /// A possibly absent value.
    Optional(Option<Box<Value>>),
    /// Text-keyed map with unique keys.
    TextMap(TextMap),
    /// Map with arbitrary value keys.
    GenMap(GenMap),
}

impl Value {
    /// Creates a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Creates a party value.
    pub fn party(value: impl Into<String>) -> Self {
        Self::Party(value.into())
    }

    /// Creates a contract id value.
    pub fn contract_id(value: impl Into<String>) -> Self {
        Self::ContractId(value.into())
    }

    /// Creates a timestamp value from microseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(micros: i64) -> Self {
        Self::Timestamp(micros)
    }

    /// Creates a populated optional.
    #[must_use]
    pub fn some(value: Value) -> Self {
        Self::Optional(Some(Box::new(value)))
    }

    /// Creates an empty optional.
    #[must_use]
    pub fn none() -> Self {
        Self::Optional(None)
    }

    /// Parses and wraps an int64 value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelError::InvalidInt64`] if `text` is not a decimal i64.
    pub fn int64(text: impl Into<String>) -> Result<Self> {
        Int64::new(text).map(Self::Int64)
    }

    /// Parses and wraps a numeric value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelError::InvalidNumeric`] if `text` is not a decimal number.
    pub fn numeric(text: impl Into<String>) -> Result<Self> {
        Numeric::new(text).map(Self::Numeric)
    }

    /// Returns the name of the populated variant.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Record(_) => "record",
            Self::Variant(_) => "variant",
            Self::Enum(_) => "enum",
            Self::ContractId(_) => "contractId",
            Self::List(_) => "list",
            Self::Int64(_) => "int64",
            Self::Numeric(_) => "numeric",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Party(_) => "party",
            Self::Bool(_) => "bool",
            Self::Unit => "unit",
            Self::Date(_) => "date",
            Self::Optional(_) => "optional",
            Self::TextMap(_) => "textMap",
            Self::GenMap(_) => "genMap",
        }
    }

    /// Returns the record if this is a record value.
    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the variant if this is a variant value.
    #[must_use]
    pub fn as_variant(&self) -> Option<&Variant> {
        match self {
            Self::Variant(variant) => Some(variant),
            _ => None,
        }
    }

    /// Returns the contract id if this is a contract id value.
    #[must_use]
    pub fn as_contract_id(&self) -> Option<&str> {
        match self {
            Self::ContractId(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the elements if this is a list value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the int64 if this is an int64 value.
    #[must_use]
    pub fn as_int64(&self) -> Option<&Int64> {
        match self {
            Self::Int64(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the numeric if this is a numeric value.
    #[must_use]
    pub fn as_numeric(&self) -> Option<&Numeric> {
        match self {
            Self::Numeric(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the text if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns epoch microseconds if this is a timestamp value.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Self::Timestamp(micros) => Some(*micros),
            _ => None,
        }
    }

    /// Returns the party if this is a party value.
    #[must_use]
    pub fn as_party(&self) -> Option<&str> {
        match self {
            Self::Party(party) => Some(party),
            _ => None,
        }
    }

    /// Returns the boolean if this is a bool value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if this is the unit value.
    #[must_use]
    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    /// Returns the day count if this is a date value.
    #[must_use]
    pub fn as_date(&self) -> Option<i32> {
        match self {
            Self::Date(days) => Some(*days),
            _ => None,
        }
    }

    /// Returns the inner option if this is an optional value.
    ///
    /// `Some(None)` is an empty optional; `None` means this is not an optional.
    #[must_use]
    pub fn as_optional(&self) -> Option<Option<&Value>> {
        match self {
            Self::Optional(inner) => Some(inner.as_deref()),
            _ => None,
        }
    }

    /// Returns the map if this is a text map value.
    #[must_use]
    pub fn as_text_map(&self) -> Option<&TextMap> {
        match self {
            Self::TextMap(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the map if this is a generic map value.
    #[must_use]
    pub fn as_gen_map(&self) -> Option<&GenMap> {
        match self {
            Self::GenMap(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(Int64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

impl From<Variant> for Value {
    fn from(value: Variant) -> Self {
        Self::Variant(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

// ============================================================================
// Numeric text types
// ============================================================================

/// A 64-bit signed integer.
///
/// Built from decimal text or a native `i64`; serializes as decimal text so
/// JSON consumers never round it through a binary float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Int64(i64);

impl Int64 {
    /// Parses decimal text as an i64.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelError::InvalidInt64`] for non-decimal text or
    /// values outside the i64 range.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let digits = text.strip_prefix('-').unwrap_or(&text);
        let parsed = if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            text.parse::<i64>().ok()
        } else {
            None
        };
        match parsed {
            Some(value) => Ok(Self(value)),
            None => InvalidInt64Snafu { input: text }.fail(),
        }
    }

    /// Returns the integer.
    #[must_use]
    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for Int64 {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<String> for Int64 {
    type Error = crate::ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Int64> for String {
    fn from(value: Int64) -> Self {
        value.0.to_string()
    }
}

impl fmt::Display for Int64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-point decimal kept in its text form.
///
/// Accepts `[-]digits[.digits]`; scale and precision limits are enforced by
/// the ledger, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Numeric(String);

impl Numeric {
    /// Validates decimal text without changing its spelling.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelError::InvalidNumeric`] for malformed text.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let unsigned = text.strip_prefix('-').unwrap_or(&text);
        let (whole, fraction) = match unsigned.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (unsigned, None),
        };
        let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        ensure!(
            is_digits(whole) && fraction.is_none_or(is_digits),
            InvalidNumericSnafu { input: text }
        );
        Ok(Self(text))
    }

    /// Returns the decimal text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Numeric {
    type Error = crate::ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Numeric> for String {
    fn from(value: Numeric) -> Self {
        value.0
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Composite values
// ============================================================================

/// One field of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    /// Field label; positional records leave it unset.
    ///
    /// The wire encodes a positional field as an empty label, so
    /// `Some(String::new())` reads back as `None`.
    pub label: Option<String>,
    /// Field value.
    pub value: Value,
}

/// A record: an optional type identifier plus ordered fields.
///
/// Labels are optional. Name lookup via [`Record::field`] returns the first
/// field with a matching label, so callers relying on it must not repeat labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Template or data type of this record, when known.
    pub record_id: Option<Identifier>,
    /// Fields in declaration order.
    pub fields: Vec<RecordField>,
}

impl Record {
    /// Creates an empty record without a type identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record type identifier.
    #[must_use]
    pub fn with_record_id(mut self, record_id: Identifier) -> Self {
        self.record_id = Some(record_id);
        self
    }

    /// Appends a labelled field.
    ///
    /// An empty label appends a positional field, matching how the ledger
    /// encodes positional fields.
    #[must_use]
    pub fn with_field(mut self, label: impl Into<String>, value: impl Into<Value>) -> Self {
        let label = Some(label.into()).filter(|label| !label.is_empty());
        self.fields.push(RecordField { label, value: value.into() });
        self
    }

    /// Appends a positional field.
    #[must_use]
    pub fn with_positional(mut self, value: impl Into<Value>) -> Self {
        self.fields.push(RecordField { label: None, value: value.into() });
        self
    }

    /// Looks up a field value by label.
    #[must_use]
    pub fn field(&self, label: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.label.as_deref() == Some(label)).map(|f| &f.value)
    }
}

/// A variant constructor applied to a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Data type of the variant, when known.
    pub variant_id: Option<Identifier>,
    /// Constructor name.
    pub constructor: String,
    /// Constructor argument.
    pub value: Box<Value>,
}

impl Variant {
    /// Creates a variant value without a type identifier.
    pub fn new(constructor: impl Into<String>, value: Value) -> Self {
        Self { variant_id: None, constructor: constructor.into(), value: Box::new(value) }
    }
}

/// An enum constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    /// Data type of the enum, when known.
    pub enum_id: Option<Identifier>,
    /// Constructor name.
    pub constructor: String,
}

/// A map from text keys to values with unique keys, in insertion order.
///
/// Deserialization goes through [`TextMap::new`], so repeated keys are
/// rejected there too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TextMapEntries", into = "TextMapEntries")]
pub struct TextMap {
    entries: Vec<(String, Value)>,
}

/// Serialized form of a [`TextMap`].
#[derive(Serialize, Deserialize)]
struct TextMapEntries {
    entries: Vec<(String, Value)>,
}

impl TextMap {
    /// Creates a map, rejecting repeated keys.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelError::DuplicateMapKey`] naming the first repeated key.
    pub fn new(entries: impl IntoIterator<Item = (String, Value)>) -> Result<Self> {
        let entries: Vec<(String, Value)> = entries.into_iter().collect();
        let mut seen = HashSet::with_capacity(entries.len());
        for (key, _) in &entries {
            ensure!(seen.insert(key.as_str()), DuplicateMapKeySnafu { key: key.clone() });
        }
        Ok(Self { entries })
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the map, returning its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }
}

impl TryFrom<TextMapEntries> for TextMap {
    type Error = crate::ModelError;

    fn try_from(value: TextMapEntries) -> Result<Self> {
        Self::new(value.entries)
    }
}

impl From<TextMap> for TextMapEntries {
    fn from(value: TextMap) -> Self {
        Self { entries: value.entries }
    }
}

/// A map with arbitrary value keys, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenMap {
    entries: Vec<(Value, Value)>,
}

impl GenMap {
    /// Creates a map from ordered entries.
    pub fn new(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    /// Returns the value for the first entry whose key equals `key`.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates over entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the map, returning its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<(Value, Value)> {
        self.entries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ModelError;

    #[test]
    fn accessors_only_see_populated_variant() {
        let value = Value::text("hello");
        assert_eq!(value.as_text(), Some("hello"));
        assert_eq!(value.as_party(), None);
        assert_eq!(value.as_bool(), None);
        assert!(value.as_int64().is_none());
        assert!(!value.is_unit());
        assert_eq!(value.variant_name(), "text");
    }

    #[test]
    fn optional_accessor_distinguishes_empty_from_other_variant() {
        assert_eq!(Value::none().as_optional(), Some(None));
        assert_eq!(Value::some(Value::Unit).as_optional(), Some(Some(&Value::Unit)));
        assert_eq!(Value::Unit.as_optional(), None);
    }

    #[test]
    fn int64_keeps_values_beyond_float_precision() {
        let value = Value::int64("9007199254740993").unwrap();
        assert_eq!(value.as_int64().unwrap().value(), 9_007_199_254_740_993);
        assert_eq!(Int64::from(i64::MIN).to_string(), "-9223372036854775808");
    }

    #[test]
    fn int64_serializes_as_decimal_text() {
        let json = serde_json::to_string(&Value::from(i64::MAX)).unwrap();
        assert_eq!(json, r#"{"int64":"9223372036854775807"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::from(i64::MAX));
        assert!(serde_json::from_str::<Value>(r#"{"int64":"9223372036854775808"}"#).is_err());
    }

    #[test]
    fn int64_rejects_malformed_text() {
        for bad in ["", "-", "1.5", "+3", "9223372036854775808", "12a"] {
            assert_eq!(
                Int64::new(bad).unwrap_err(),
                ModelError::InvalidInt64 { input: bad.to_string() },
                "{bad}"
            );
        }
    }

    #[test]
    fn numeric_accepts_decimal_text() {
        for good in ["0", "-1", "123.4500000000", "99999999999999999999999999.1"] {
            assert_eq!(Numeric::new(good).unwrap().as_str(), good);
        }
        for bad in ["", ".5", "5.", "1e10", "--1", "1.2.3"] {
            assert!(Numeric::new(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn record_field_lookup_by_label() {
        let record = Record::new()
            .with_field("owner", Value::party("Alice"))
            .with_positional(Value::Unit)
            .with_field("amount", Value::numeric("10.0").unwrap());

        assert_eq!(record.field("owner"), Some(&Value::party("Alice")));
        assert_eq!(record.field("amount").and_then(Value::as_numeric).unwrap().as_str(), "10.0");
        assert_eq!(record.field("missing"), None);
        assert_eq!(record.fields.len(), 3);
    }

    #[test]
    fn empty_label_appends_positional_field() {
        let record = Record::new().with_field("", Value::Unit).with_field("x", Value::Unit);
        assert_eq!(record.fields[0].label, None);
        assert_eq!(record.fields[1].label.as_deref(), Some("x"));
        assert_eq!(record.field(""), None);
    }

    #[test]
    fn text_map_rejects_duplicate_keys() {
        let err = TextMap::new([
            ("a".to_string(), Value::Unit),
            ("b".to_string(), Value::Unit),
            ("a".to_string(), Value::Bool(true)),
        ])
        .unwrap_err();
        assert_eq!(err, ModelError::DuplicateMapKey { key: "a".to_string() });
    }

    #[test]
    fn text_map_deserialization_rejects_duplicate_keys() {
        let json = r#"{"entries":[["a","unit"],["a",{"bool":true}]]}"#;
        let err = serde_json::from_str::<TextMap>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate text map key 'a'"), "{err}");

        let nested = r#"{"textMap":{"entries":[["k","unit"],["k","unit"]]}}"#;
        assert!(serde_json::from_str::<Value>(nested).is_err());
    }

    #[test]
    fn text_map_serde_preserves_entries() {
        let map = TextMap::new([
            ("z".to_string(), Value::Unit),
            ("a".to_string(), Value::Bool(true)),
        ])
        .unwrap();
        let json = serde_json::to_string(&Value::TextMap(map.clone())).unwrap();
        assert_eq!(json, r#"{"textMap":{"entries":[["z","unit"],["a",{"bool":true}]]}}"#);
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), Value::TextMap(map));
    }

    #[test]
    fn text_map_preserves_order() {
        let map = TextMap::new([
            ("z".to_string(), Value::from(1)),
            ("a".to_string(), Value::from(2)),
        ])
        .unwrap();
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(map.get("a"), Some(&Value::from(2)));
    }

    #[test]
    fn gen_map_lookup_by_value_key() {
        let map = GenMap::new([(Value::from(1), Value::text("one"))]);
        assert_eq!(map.get(&Value::from(1)), Some(&Value::text("one")));
        assert_eq!(map.get(&Value::from(2)), None);
    }
}
