//! Opaque continuation tokens for keyset pagination.
//!
//! A token is URL-safe base64 over JSON holding the canonical query and the
//! sort values of the last row served. Resuming from it yields the rows
//! strictly after that row in the full ordering, with nulls sorting last in
//! both directions.

use crate::condition::{Operator, Record, SearchCondition, SqlValue};
use crate::query::{NormalizedQuery, RawQuery};
use crate::sort::{SortDirection, SortKey, SortSpecification};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::iter;
use thiserror::Error;

/// Current token format version.
pub const CURSOR_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("continuation token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("continuation token payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unsupported continuation token version {0}")]
    UnsupportedVersion(u64),
}

/// Sort values of the last row on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AfterKey {
    /// One value per business sort key, in sort order
    pub sort_values: Vec<SqlValue>,
    pub tie_breaker: SqlValue,
}

impl AfterKey {
    /// Capture the sort values of `record`.
    pub fn from_record(sort: &SortSpecification, record: &impl Record) -> Self {
        Self {
            sort_values: sort
                .business_keys()
                .iter()
                .map(|key| record.field(&key.field))
                .collect(),
            tie_breaker: sort
                .tie_breaker()
                .map(|key| record.field(&key.field))
                .unwrap_or(SqlValue::Null),
        }
    }
}

/// Decoded token contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPayload {
    #[serde(rename = "v")]
    pub version: u64,
    pub resource_type: String,
    pub query: RawQuery,
    pub after: AfterKey,
}

/// Mint a token resuming `query` after `last`.
pub fn mint(query: &NormalizedQuery, last: &impl Record) -> Result<String, CursorError> {
    let payload = CursorPayload {
        version: CURSOR_VERSION,
        resource_type: query.resource_type.clone(),
        query: query.canonical(),
        after: AfterKey::from_record(&query.sort, last),
    };
    let json = serde_json::to_vec(&payload)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a token minted by [`mint`].
pub fn decode(token: &str) -> Result<CursorPayload, CursorError> {
    let bytes = URL_SAFE_NO_PAD.decode(token)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    let version = value
        .get("v")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or_default();
    if version != CURSOR_VERSION {
        return Err(CursorError::UnsupportedVersion(version));
    }
    Ok(serde_json::from_value(value)?)
}

/// Rows strictly after `after` in `sort` order.
///
/// Expands to `k0 > v0 OR (k0 = v0 AND k1 > v1) OR ...`, flipping the
/// comparison for descending keys. Business keys are nullable; the
/// tie-breaker is not.
pub fn continuation_condition(after: &AfterKey, sort: &SortSpecification) -> SearchCondition {
    let values = after.sort_values.iter().chain(iter::once(&after.tie_breaker));
    let pairs: Vec<(&SortKey, &SqlValue)> = sort.keys().iter().zip(values).collect();
    let last = pairs.len().saturating_sub(1);

    let branches = (0..pairs.len())
        .map(|i| {
            let mut terms: Vec<SearchCondition> = pairs[..i]
                .iter()
                .map(|(key, value)| equal_to(&key.field, value))
                .collect();
            let (key, value) = pairs[i];
            terms.push(strictly_after(key, value, i < last));
            SearchCondition::and(terms)
        })
        .collect();
    SearchCondition::or(branches)
}

/// Conjoin the filter with the continuation condition.
pub fn build_continuation_condition(
    base: SearchCondition,
    after: &AfterKey,
    sort: &SortSpecification,
) -> SearchCondition {
    SearchCondition::and(vec![base, continuation_condition(after, sort)])
}

fn equal_to(field: &str, value: &SqlValue) -> SearchCondition {
    match value {
        SqlValue::Null => SearchCondition::IsNull(field.to_string()),
        value => SearchCondition::eq(field, value.clone()),
    }
}

fn strictly_after(key: &SortKey, value: &SqlValue, nullable: bool) -> SearchCondition {
    // Nulls sort last, so nothing comes after a null except tie-broken nulls.
    if value.is_null() {
        return SearchCondition::False;
    }
    let op = match key.direction {
        SortDirection::Asc => Operator::Gt,
        SortDirection::Desc => Operator::Lt,
    };
    let compare = SearchCondition::compare(&key.field, op, value.clone());
    if nullable {
        SearchCondition::or(vec![compare, SearchCondition::IsNull(key.field.clone())])
    } else {
        compare
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::default_registry;
    use crate::settings::SearchSettings;
    use crate::validation::validate_query;
    use std::collections::HashMap;

    struct Row(HashMap<&'static str, SqlValue>);

    impl Record for Row {
        fn field(&self, path: &str) -> SqlValue {
            self.0.get(path).cloned().unwrap_or(SqlValue::Null)
        }
    }

    fn query(raw: &str) -> NormalizedQuery {
        validate_query(
            &default_registry(&SearchSettings::default()),
            "Patient",
            &RawQuery::parse(raw),
        )
        .unwrap()
    }

    #[test]
    fn test_mint_then_decode() {
        let query = query("family:contains=ann&_sort=-birthdate&_count=5&_page=2");
        let row = Row(HashMap::from([
            ("id", SqlValue::text("p-9")),
            ("date_of_birth", SqlValue::Date("1990-01-01".into())),
        ]));
        let token = mint(&query, &row).unwrap();
        assert!(!token.contains('='));

        let payload = decode(&token).unwrap();
        assert_eq!(payload.resource_type, "Patient");
        assert_eq!(
            payload.query,
            RawQuery::from_pairs([
                ("family:contains", "ann"),
                ("_count", "5"),
                ("_sort", "-birthdate"),
            ])
        );
        assert_eq!(
            payload.after,
            AfterKey {
                sort_values: vec![SqlValue::Date("1990-01-01".into())],
                tie_breaker: SqlValue::text("p-9"),
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage_and_stale_versions() {
        assert!(matches!(decode("not base64!"), Err(CursorError::Encoding(_))));
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(matches!(decode(&not_json), Err(CursorError::Payload(_))));
        let stale = URL_SAFE_NO_PAD.encode(r#"{"v":0,"resource_type":"Patient"}"#);
        assert!(matches!(decode(&stale), Err(CursorError::UnsupportedVersion(0))));
    }

    #[test]
    fn test_tie_breaker_only() {
        let query = query("");
        let after = AfterKey {
            sort_values: vec![],
            tie_breaker: SqlValue::text("p-5"),
        };
        assert_eq!(
            continuation_condition(&after, &query.sort),
            SearchCondition::compare("id", Operator::Lt, SqlValue::text("p-5"))
        );
    }

    #[test]
    fn test_lexicographic_expansion() {
        let query = query("_sort=family");
        let after = AfterKey {
            sort_values: vec![SqlValue::text("Ng")],
            tie_breaker: SqlValue::text("p-5"),
        };
        assert_eq!(
            continuation_condition(&after, &query.sort),
            SearchCondition::Or(vec![
                SearchCondition::compare("last_name", Operator::Gt, SqlValue::text("Ng")),
                SearchCondition::IsNull("last_name".into()),
                SearchCondition::And(vec![
                    SearchCondition::eq("last_name", SqlValue::text("Ng")),
                    SearchCondition::compare("id", Operator::Lt, SqlValue::text("p-5")),
                ]),
            ])
        );
    }

    #[test]
    fn test_null_sort_value_only_resumes_within_nulls() {
        let query = query("_sort=family");
        let after = AfterKey {
            sort_values: vec![SqlValue::Null],
            tie_breaker: SqlValue::text("p-5"),
        };
        assert_eq!(
            continuation_condition(&after, &query.sort),
            SearchCondition::And(vec![
                SearchCondition::IsNull("last_name".into()),
                SearchCondition::compare("id", Operator::Lt, SqlValue::text("p-5")),
            ])
        );
    }
}
