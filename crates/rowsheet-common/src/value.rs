use std::collections::BTreeMap;
use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single field of an inbound row payload.
///
/// Payloads arrive as loosely typed JSON objects; each field is narrowed to
/// one of these variants before it reaches the codec. A field that is not
/// present in the payload at all is *absent* and has no `FieldValue`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Render the value the way it is stored in a cell.
    ///
    /// `Null` renders as the empty cell, integral numbers drop the decimal
    /// point and booleans use the spreadsheet spelling.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(true) => "TRUE".to_string(),
            FieldValue::Bool(false) => "FALSE".to_string(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Text(s) => s.clone(),
        }
    }

    /// `true` for `Null` and the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Narrow a JSON value. Arrays and objects have no cell form and yield `None`.
    #[cfg(feature = "json")]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell())
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

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Inbound object form of a row: field name to value.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a record from a JSON object, reporting the first field that has
    /// no scalar form.
    #[cfg(feature = "json")]
    pub fn from_json_object(
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, String> {
        let mut record = Record::new();
        for (name, value) in object {
            match FieldValue::from_json(value) {
                Some(v) => record.insert(name.clone(), v),
                None => return Err(name.clone()),
            }
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Decoded form of a row: every key of the sheet mapped to its cell text.
pub type RowObject = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(FieldValue::Number(7.0).to_cell(), "7");
        assert_eq!(FieldValue::Number(-12.0).to_cell(), "-12");
        assert_eq!(FieldValue::Number(0.25).to_cell(), "0.25");
        assert_eq!(FieldValue::Number(1e20).to_cell(), "100000000000000000000");
    }

    #[test]
    fn blank_values() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::Text(String::new()).is_blank());
        assert!(!FieldValue::Text(" ".into()).is_blank());
        assert!(!FieldValue::Bool(false).is_blank());
        assert_eq!(FieldValue::Null.to_cell(), "");
        assert_eq!(FieldValue::Bool(true).to_cell(), "TRUE");
    }

    #[test]
    fn record_builder_and_lookup() {
        let record = Record::new().with("id", "7").with("qty", 3i64);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("id"), Some(&FieldValue::Text("7".into())));
        assert_eq!(record.get("qty").map(FieldValue::to_cell).as_deref(), Some("3"));
        assert!(!record.contains("name"));
        assert_eq!(record.names().collect::<Vec<_>>(), vec!["id", "qty"]);
    }

    #[cfg(feature = "json")]
    #[test]
    fn record_from_json_rejects_nested_values() {
        let value = serde_json::json!({"id": "1", "tags": ["a"]});
        let err = Record::from_json_object(value.as_object().unwrap()).unwrap_err();
        assert_eq!(err, "tags");

        let value = serde_json::json!({"id": 1, "name": null, "ok": true});
        let record = Record::from_json_object(value.as_object().unwrap()).unwrap();
        assert_eq!(record.get("id"), Some(&FieldValue::Number(1.0)));
        assert_eq!(record.get("name"), Some(&FieldValue::Null));
        assert_eq!(record.get("ok"), Some(&FieldValue::Bool(true)));
    }
}
