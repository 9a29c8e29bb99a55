//! Tagged record values and the ordered record container.
//!
//! Records arrive as JSON-like maps. They are converted once, at the
//! ingestion boundary, into a [`Record`] of [`FieldValue`]s so sanitization
//! and upsert code never inspect raw JSON types again.

use std::fmt;

use serde_json::{Map, Number, Value as JsonValue};

/// Reserved primary-key field.
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    /// Lists and maps; stored as compact JSON text.
    Json(JsonValue),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, FieldValue::Json(_))
    }

    /// The TEXT form written to the database; `None` means SQL NULL.
    pub fn to_stored(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Json(value) => Some(value.to_string()),
        }
    }

    /// Collapses a compound value into its serialized text.
    pub fn serialize_compound(self) -> FieldValue {
        match self {
            FieldValue::Json(value) => FieldValue::Text(value.to_string()),
            other => other,
        }
    }
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(b),
            JsonValue::Number(n) => FieldValue::Number(n),
            JsonValue::String(s) => FieldValue::Text(s),
            compound @ (JsonValue::Array(_) | JsonValue::Object(_)) => FieldValue::Json(compound),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(Number::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_stored() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

/// Ordered field-name → value association.
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Builds a record from a JSON object, keeping key order.
    pub fn from_json_map(map: Map<String, JsonValue>) -> Self {
        let mut record = Record::with_capacity(map.len());
        for (key, value) in map {
            record.fields.push((key, FieldValue::from(value)));
        }
        record
    }

    /// Accepts only JSON objects; anything else yields `None`.
    pub fn from_json(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(map) => Some(Self::from_json_map(map)),
            _ => None,
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stored_forms_are_text() {
        assert_eq!(FieldValue::from(json!(1)).to_stored().as_deref(), Some("1"));
        assert_eq!(FieldValue::from(json!(2.5)).to_stored().as_deref(), Some("2.5"));
        assert_eq!(FieldValue::from(json!(true)).to_stored().as_deref(), Some("true"));
        assert_eq!(FieldValue::from(json!(null)).to_stored(), None);
        assert_eq!(
            FieldValue::from(json!({"a": [1, 2]})).to_stored().as_deref(),
            Some(r#"{"a":[1,2]}"#)
        );
    }

    #[test]
    fn record_preserves_insertion_order_and_replaces_in_place() {
        let mut record = Record::new();
        record.insert("b", "1");
        record.insert("a", "2");
        record.insert("b", "3");
        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(record.get("b"), Some(&FieldValue::Text("3".to_string())));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(Record::from_json(json!([1, 2])).is_none());
        let record = Record::from_json(json!({"z": 1, "y": 2})).expect("object");
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["z", "y"]);
    }
}
