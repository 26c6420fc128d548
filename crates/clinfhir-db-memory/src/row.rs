use clinfhir_search::{Record, SqlValue};
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RowError {
    #[error("row must be a JSON object")]
    NotAnObject,
    #[error("row is missing an \"id\" string")]
    MissingId,
}

/// A stored row: flat field paths to values.
///
/// Nested relations use dotted paths, e.g. `additional_data.city_town`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: IndexMap<String, SqlValue>,
}

impl Row {
    pub fn new(id: impl Into<String>) -> Self {
        Self::default().with("id", SqlValue::Text(id.into()))
    }

    pub fn with(mut self, path: impl Into<String>, value: impl Into<RowValue>) -> Self {
        self.set(path, value);
        self
    }

    pub fn set(&mut self, path: impl Into<String>, value: impl Into<RowValue>) {
        self.fields.insert(path.into(), value.into().0);
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(SqlValue::as_text)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a row from a JSON object, flattening nested objects into dotted paths.
    pub fn from_json(value: &Value) -> Result<Self, RowError> {
        let Value::Object(object) = value else {
            return Err(RowError::NotAnObject);
        };
        let mut row = Self::default();
        flatten(&mut row, None, object);
        if row.id().is_none() {
            return Err(RowError::MissingId);
        }
        Ok(row)
    }
}

fn flatten(row: &mut Row, prefix: Option<&str>, object: &serde_json::Map<String, Value>) {
    for (key, value) in object {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten(row, Some(&path), nested),
            Value::String(s) => row.set(path, s.as_str()),
            Value::Bool(b) => row.set(path, *b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => row.set(path, i),
                None => row.set(path, n.to_string().as_str()),
            },
            Value::Null | Value::Array(_) => row.set(path, SqlValue::Null),
        }
    }
}

impl Record for Row {
    fn field(&self, path: &str) -> SqlValue {
        self.fields.get(path).cloned().unwrap_or(SqlValue::Null)
    }
}

/// Conversion target for [`Row::with`].
pub struct RowValue(SqlValue);

impl From<SqlValue> for RowValue {
    fn from(value: SqlValue) -> Self {
        Self(value)
    }
}

impl From<&str> for RowValue {
    fn from(value: &str) -> Self {
        Self(SqlValue::Text(value.to_string()))
    }
}

impl From<bool> for RowValue {
    fn from(value: bool) -> Self {
        Self(SqlValue::Boolean(value))
    }
}

impl From<i64> for RowValue {
    fn from(value: i64) -> Self {
        Self(SqlValue::Integer(value))
    }
}

impl<T: Into<RowValue>> From<Option<T>> for RowValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self(SqlValue::Null))
    }
}
