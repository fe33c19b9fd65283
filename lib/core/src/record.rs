use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of a record, unique within an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Integer(u64),
    Uuid(Uuid),
    String(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::String(s) => write!(f, "{}", s),
            RecordId::Uuid(u) => write!(f, "{}", u),
            RecordId::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::String(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::String(s.to_string())
    }
}

impl From<u64> for RecordId {
    fn from(i: u64) -> Self {
        RecordId::Integer(i)
    }
}

impl From<Uuid> for RecordId {
    fn from(u: Uuid) -> Self {
        RecordId::Uuid(u)
    }
}

impl RecordId {
    /// Parse an id coming from a URL path segment.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<u64>() {
            RecordId::Integer(i)
        } else if let Ok(u) = Uuid::parse_str(raw) {
            RecordId::Uuid(u)
        } else {
            RecordId::String(raw.to_string())
        }
    }

    /// Every id a URL path segment may stand for, most specific first.
    ///
    /// `"42"` can name `Integer(42)` or a record ingested with the string
    /// id `"42"`; both are candidates.
    pub fn candidates(raw: &str) -> Vec<Self> {
        match Self::parse(raw) {
            RecordId::String(s) => vec![RecordId::String(s)],
            parsed => vec![parsed, RecordId::String(raw.to_string())],
        }
    }
}

/// The closed set of value kinds a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Number => write!(f, "number"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Text(_) => FieldKind::Text,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

/// An ingested item: a stable id plus named field values.
///
/// Serializes flat, e.g. `{"id": 1, "description": "...", "rating": 5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Build a record from a JSON object holding an `id` and flat fields.
    pub fn from_json(value: serde_json::Value) -> crate::Result<Self> {
        serde_json::from_value(value).map_err(|e| crate::Error::InvalidRecord(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_flat_json() {
        let record = Record::from_json(json!({
            "id": 2,
            "description": "High-end toothbrush created with no compromises.",
            "rating": 5
        }))
        .unwrap();

        assert_eq!(record.id, RecordId::Integer(2));
        assert_eq!(record.get("rating"), Some(&FieldValue::Number(5.0)));
        assert_eq!(
            record.get("description").and_then(|v| v.as_text()),
            Some("High-end toothbrush created with no compromises.")
        );
    }

    #[test]
    fn test_record_rejects_unknown_value_kinds() {
        let result = Record::from_json(json!({"id": "a", "in_stock": true}));
        assert!(matches!(result, Err(crate::Error::InvalidRecord(_))));

        let missing_id = Record::from_json(json!({"text": "no id"}));
        assert!(missing_id.is_err());
    }

    #[test]
    fn test_record_id_variants() {
        let string_id: RecordId = serde_json::from_value(json!("review-1")).unwrap();
        let int_id: RecordId = serde_json::from_value(json!(42)).unwrap();

        assert_eq!(string_id, RecordId::from("review-1"));
        assert_eq!(int_id, RecordId::Integer(42));
        assert_eq!(serde_json::to_string(&int_id).unwrap(), "42");
    }

    #[test]
    fn test_record_id_parse() {
        assert_eq!(RecordId::parse("7"), RecordId::Integer(7));
        assert_eq!(RecordId::parse("abc"), RecordId::from("abc"));
        let u = Uuid::new_v4();
        assert_eq!(RecordId::parse(&u.to_string()), RecordId::Uuid(u));
    }

    #[test]
    fn test_numeric_string_id_is_a_candidate() {
        let stored: Record = serde_json::from_str(r#"{"id": "42", "text": "x"}"#).unwrap();
        assert_eq!(stored.id, RecordId::from("42"));

        let candidates = RecordId::candidates("42");
        assert_eq!(candidates, vec![RecordId::Integer(42), RecordId::from("42")]);
        assert!(candidates.contains(&stored.id));

        assert_eq!(RecordId::candidates("abc"), vec![RecordId::from("abc")]);
    }
}
