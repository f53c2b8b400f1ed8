//! Field-keyed captures of a document's state
//!
//! A [`Snapshot`] is what a history record stores and what the diff and
//! rollback paths read back. Missing keys read as [`FieldValue::Empty`] so a
//! snapshot taken before a field existed still compares and applies cleanly.
use crate::error::ValidationError;
use crate::types::{CalendarDate, TimeStamp};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    #[n(0)]
    Empty,
    #[n(1)]
    Text(#[n(0)] String),
    #[n(2)]
    Amount(#[n(0)] u64),
    #[n(3)]
    Date(#[n(0)] CalendarDate),
    #[n(4)]
    Timestamp(#[n(0)] TimeStamp<Utc>),
}

static EMPTY: FieldValue = FieldValue::Empty;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(#[n(0)] BTreeMap<String, FieldValue>);

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }
    pub fn optional_text(value: Option<&str>) -> Self {
        value.map_or(FieldValue::Empty, FieldValue::text)
    }
    pub fn optional_date(value: Option<CalendarDate>) -> Self {
        value.map_or(FieldValue::Empty, FieldValue::Date)
    }
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }

    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Empty => "empty",
            FieldValue::Text(_) => "text",
            FieldValue::Amount(_) => "amount",
            FieldValue::Date(_) => "date",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => f.write_str("None"),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Amount(value) => write!(f, "{value}"),
            FieldValue::Date(value) => write!(f, "{value}"),
            FieldValue::Timestamp(value) => write!(f, "{value}"),
        }
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, field: &str, value: FieldValue) -> Self {
        self.0.insert(field.to_string(), value);
        self
    }
    /// Value stored under `field`, or `Empty` when the snapshot never had it.
    pub fn get(&self, field: &str) -> &FieldValue {
        self.0.get(field).unwrap_or(&EMPTY)
    }
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Typed readers used when a snapshot is applied back onto a document.
    // `Ok(None)` means the key is absent and the field is left alone.

    pub fn read_text(&self, field: &str) -> Result<Option<Option<String>>, ValidationError> {
        match self.0.get(field) {
            None => Ok(None),
            Some(FieldValue::Empty) => Ok(Some(None)),
            Some(FieldValue::Text(value)) => Ok(Some(Some(value.clone()))),
            Some(other) => Err(mismatch(field, "text", other)),
        }
    }
    pub fn read_amount(&self, field: &str) -> Result<Option<u64>, ValidationError> {
        match self.0.get(field) {
            None => Ok(None),
            Some(FieldValue::Amount(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(field, "amount", other)),
        }
    }
    pub fn read_date(&self, field: &str) -> Result<Option<Option<CalendarDate>>, ValidationError> {
        match self.0.get(field) {
            None => Ok(None),
            Some(FieldValue::Empty) => Ok(Some(None)),
            Some(FieldValue::Date(value)) => Ok(Some(Some(*value))),
            Some(other) => Err(mismatch(field, "date", other)),
        }
    }
    /// Required text parsed into an enum-like value.
    pub fn read_parsed<T>(&self, field: &str) -> Result<Option<T>, ValidationError>
    where
        T: std::str::FromStr,
    {
        match self.0.get(field) {
            None => Ok(None),
            Some(FieldValue::Text(value)) => value.parse().map(Some).map_err(|_| {
                ValidationError::SnapshotField {
                    field: field.to_string(),
                    reason: format!("unknown value `{value}`"),
                }
            }),
            Some(other) => Err(mismatch(field, "text", other)),
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, minicbor::encode::Error<std::convert::Infallible>> {
        minicbor::to_vec(self)
    }
    /// Hex sha256 over the CBOR encoding, stored next to the snapshot.
    pub fn digest(&self) -> Result<String, minicbor::encode::Error<std::convert::Infallible>> {
        Ok(sha256::digest(&self.to_cbor()?))
    }
}

fn mismatch(field: &str, expected: &str, found: &FieldValue) -> ValidationError {
    ValidationError::SnapshotField {
        field: field.to_string(),
        reason: format!("expected {expected}, found {}", found.kind()),
    }
}
