//! Backend-neutral predicate tree.
//!
//! Conditions are built by the predicate builder and the cursor codec and
//! consumed either by the SQL renderer or by an in-memory evaluator.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators for search conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Greater than (>)
    Gt,
    /// Less than (<)
    Lt,
    /// Substring match
    Contains,
    /// Prefix match
    StartsWith,
    /// Suffix match
    EndsWith,
}

impl Operator {
    /// Get the SQL operator string.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Contains | Self::StartsWith | Self::EndsWith => "LIKE",
        }
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

/// Typed values carried by conditions, cursors and rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    /// ISO-8601 date or date-time text.
    Date(String),
    Null,
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Date(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a string for display/debugging.
    pub fn as_display_str(&self) -> String {
        match self {
            Self::Text(s) | Self::Date(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Null => "NULL".to_string(),
        }
    }

    /// Uppercased copy of a text value; other values are returned unchanged.
    pub fn to_uppercase(&self) -> Self {
        match self {
            Self::Text(s) => Self::Text(s.to_uppercase()),
            other => other.clone(),
        }
    }

    /// Order two non-null values of compatible types.
    ///
    /// Text and date values compare lexically, which matches ISO-8601 order.
    /// Returns `None` when either side is null or the types differ.
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Null, _) | (_, Self::Null) => None,
            (a, b) => match (a.as_text(), b.as_text()) {
                (Some(a), Some(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_display_str())
    }
}

/// A search condition that can be combined with other conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCondition {
    /// `field op value`, optionally comparing upper-cased text on both sides.
    Compare {
        field: String,
        op: Operator,
        value: SqlValue,
        case_insensitive: bool,
    },

    /// `field IS NULL`
    IsNull(String),

    /// `field IS NOT NULL`
    IsNotNull(String),

    /// Combine conditions with AND
    And(Vec<SearchCondition>),

    /// Combine conditions with OR
    Or(Vec<SearchCondition>),

    /// Negation of a condition
    Not(Box<SearchCondition>),

    /// Always true (used for empty AND lists)
    True,

    /// Always false (used for empty OR lists)
    False,
}

impl SearchCondition {
    /// Create a case-sensitive comparison.
    pub fn compare(field: impl Into<String>, op: Operator, value: SqlValue) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value,
            case_insensitive: false,
        }
    }

    pub fn eq(field: impl Into<String>, value: SqlValue) -> Self {
        Self::compare(field, Operator::Eq, value)
    }

    /// Create an OR condition. `False` members are dropped and a `True`
    /// member absorbs the whole disjunction.
    pub fn or(conditions: Vec<SearchCondition>) -> Self {
        let mut kept = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match condition {
                Self::False => {}
                Self::True => return Self::True,
                Self::Or(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::False,
            1 => kept.pop().unwrap_or(Self::False),
            _ => Self::Or(kept),
        }
    }

    /// Create an AND condition. `True` members are dropped and a `False`
    /// member absorbs the whole conjunction.
    pub fn and(conditions: Vec<SearchCondition>) -> Self {
        let mut kept = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match condition {
                Self::True => {}
                Self::False => return Self::False,
                Self::And(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::True,
            1 => kept.pop().unwrap_or(Self::True),
            _ => Self::And(kept),
        }
    }

    /// Create a NOT condition.
    pub fn negate(condition: SearchCondition) -> Self {
        match condition {
            Self::True => Self::False,
            Self::False => Self::True,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Evaluate against a record. Comparisons involving null are false.
    pub fn matches(&self, record: &impl Record) -> bool {
        match self {
            Self::Compare {
                field,
                op,
                value,
                case_insensitive,
            } => {
                let actual = record.field(field);
                let actual = if *case_insensitive {
                    actual.to_uppercase()
                } else {
                    actual
                };
                compare_values(&actual, *op, value)
            }
            Self::IsNull(field) => record.field(field).is_null(),
            Self::IsNotNull(field) => !record.field(field).is_null(),
            Self::And(conditions) => conditions.iter().all(|c| c.matches(record)),
            Self::Or(conditions) => conditions.iter().any(|c| c.matches(record)),
            Self::Not(condition) => !condition.matches(record),
            Self::True => true,
            Self::False => false,
        }
    }

    /// Every field referenced by this condition, in first-use order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { field, .. } | Self::IsNull(field) | Self::IsNotNull(field) => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Self::And(conditions) | Self::Or(conditions) => {
                for condition in conditions {
                    condition.collect_fields(out);
                }
            }
            Self::Not(condition) => condition.collect_fields(out),
            Self::True | Self::False => {}
        }
    }
}

fn compare_values(actual: &SqlValue, op: Operator, expected: &SqlValue) -> bool {
    if op.is_pattern() {
        let (Some(actual), Some(expected)) = (actual.as_text(), expected.as_text()) else {
            return false;
        };
        return match op {
            Operator::Contains => actual.contains(expected),
            Operator::StartsWith => actual.starts_with(expected),
            _ => actual.ends_with(expected),
        };
    }

    let Some(ordering) = actual.compare(expected) else {
        return false;
    };
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Contains | Operator::StartsWith | Operator::EndsWith => false,
    }
}

/// A stored row exposing its searchable fields by path.
///
/// Paths are the field names descriptors map to, e.g. `first_name` or
/// `additional_data.city_town`. Missing fields read as [`SqlValue::Null`].
pub trait Record {
    fn field(&self, path: &str) -> SqlValue;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapRecord(HashMap<&'static str, SqlValue>);

    impl Record for MapRecord {
        fn field(&self, path: &str) -> SqlValue {
            self.0.get(path).cloned().unwrap_or(SqlValue::Null)
        }
    }

    fn record() -> MapRecord {
        MapRecord(HashMap::from([
            ("first_name", SqlValue::text("Annabelle")),
            ("date_of_birth", SqlValue::Date("1990-05-20".into())),
            ("age", SqlValue::Integer(34)),
        ]))
    }

    #[test]
    fn test_or_and_simplification() {
        assert_eq!(SearchCondition::or(vec![]), SearchCondition::False);
        assert_eq!(SearchCondition::and(vec![]), SearchCondition::True);

        let leaf = SearchCondition::IsNull("a".into());
        assert_eq!(
            SearchCondition::or(vec![SearchCondition::False, leaf.clone()]),
            leaf
        );
        assert_eq!(
            SearchCondition::and(vec![leaf.clone(), SearchCondition::False]),
            SearchCondition::False
        );
        assert_eq!(
            SearchCondition::or(vec![leaf.clone(), SearchCondition::True]),
            SearchCondition::True
        );
    }

    #[test]
    fn test_nested_flattening() {
        let a = SearchCondition::IsNull("a".into());
        let b = SearchCondition::IsNull("b".into());
        let c = SearchCondition::IsNull("c".into());
        let nested = SearchCondition::and(vec![
            SearchCondition::and(vec![a.clone(), b.clone()]),
            c.clone(),
        ]);
        assert_eq!(nested, SearchCondition::And(vec![a, b, c]));
    }

    #[test]
    fn test_case_insensitive_match_uppercases_column() {
        let condition = SearchCondition::Compare {
            field: "first_name".into(),
            op: Operator::StartsWith,
            value: SqlValue::text("ANNA"),
            case_insensitive: true,
        };
        assert!(condition.matches(&record()));

        let sensitive = SearchCondition::compare(
            "first_name",
            Operator::StartsWith,
            SqlValue::text("ANNA"),
        );
        assert!(!sensitive.matches(&record()));
    }

    #[test]
    fn test_null_comparisons_are_false() {
        let condition = SearchCondition::eq("date_of_death", SqlValue::text("x"));
        assert!(!condition.matches(&record()));
        assert!(SearchCondition::IsNull("date_of_death".into()).matches(&record()));
        assert!(SearchCondition::IsNotNull("first_name".into()).matches(&record()));
    }

    #[test]
    fn test_ordering_comparisons() {
        let before = SearchCondition::compare(
            "date_of_birth",
            Operator::Lt,
            SqlValue::Date("2000-01-01".into()),
        );
        assert!(before.matches(&record()));

        let older = SearchCondition::compare("age", Operator::Gt, SqlValue::Integer(40));
        assert!(!older.matches(&record()));
        assert!(SearchCondition::negate(older).matches(&record()));
    }

    #[test]
    fn test_fields_are_deduplicated() {
        let condition = SearchCondition::or(vec![
            SearchCondition::eq("a", SqlValue::Integer(1)),
            SearchCondition::and(vec![
                SearchCondition::IsNull("b".into()),
                SearchCondition::eq("a", SqlValue::Integer(2)),
            ]),
        ]);
        assert_eq!(condition.fields(), vec!["a", "b"]);
    }

    #[test]
    fn test_sql_value_serde_shape() {
        let json = serde_json::to_value(SqlValue::Date("2020-01".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "date", "value": "2020-01"}));
        let null: SqlValue = serde_json::from_value(serde_json::json!({"type": "null"})).unwrap();
        assert!(null.is_null());
    }
}
