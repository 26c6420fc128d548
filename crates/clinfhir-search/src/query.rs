use crate::condition::SqlValue;
use crate::cursor::AfterKey;
use crate::filter::FilterExpression;
use crate::parameters::SearchModifier;
use crate::registry::{COUNT_PARAM, FILTER_PARAM, INCLUDE_PARAM, SORT_PARAM};
use crate::sort::SortSpecification;
use serde::{Deserialize, Serialize};

/// Query parameters in request order, duplicates preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawQuery {
    pairs: Vec<(String, String)>,
}

impl RawQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an URL query string (without the leading `?`).
    pub fn parse(query: &str) -> Self {
        let pairs = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value supplied for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }

    /// Serialize back to an URL query string.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// One validated, coerced search parameter occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedParam {
    /// Key as supplied, e.g. `given:contains`
    pub key: String,
    /// Descriptor name, e.g. `given`
    pub name: String,
    pub modifier: Option<SearchModifier>,
    pub raw: String,
    pub value: SqlValue,
}

/// A fully validated search request.
#[derive(Debug, Clone)]
pub struct NormalizedQuery {
    pub resource_type: String,
    pub params: Vec<NormalizedParam>,
    pub count: usize,
    pub page: usize,
    /// Raw `_count` as supplied, kept for continuation tokens.
    pub count_raw: Option<String>,
    pub sort: SortSpecification,
    pub sort_raw: Option<String>,
    pub includes: Vec<String>,
    pub filter: Option<FilterExpression>,
    pub filter_raw: Option<String>,
    /// Resume position decoded from a continuation token.
    pub after: Option<AfterKey>,
}

impl NormalizedQuery {
    pub fn param(&self, key: &str) -> Option<&NormalizedParam> {
        self.params.iter().find(|p| p.key == key)
    }

    /// Rows to skip; offset paging only applies before the first cursor.
    pub fn offset(&self) -> usize {
        if self.after.is_some() {
            0
        } else {
            self.page.saturating_mul(self.count)
        }
    }

    /// The query in canonical form, without offset or cursor pagination.
    ///
    /// Embedded in continuation tokens so later pages re-run the same search.
    pub fn canonical(&self) -> RawQuery {
        let mut raw = RawQuery::new();
        for param in &self.params {
            raw.push(&param.key, &param.raw);
        }
        if let Some(count) = &self.count_raw {
            raw.push(COUNT_PARAM, count);
        }
        if let Some(sort) = &self.sort_raw {
            raw.push(SORT_PARAM, sort);
        }
        for include in &self.includes {
            raw.push(INCLUDE_PARAM, include);
        }
        if let Some(filter) = &self.filter_raw {
            raw.push(FILTER_PARAM, filter);
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order_and_duplicates() {
        let raw = RawQuery::parse("?given=Anna&_include=a&_include=b&family=O%27Brien");
        let pairs: Vec<_> = raw.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("given", "Anna"),
                ("_include", "a"),
                ("_include", "b"),
                ("family", "O'Brien"),
            ]
        );
        assert_eq!(raw.get("_include"), Some("a"));
        assert!(!raw.contains_key("_count"));
    }

    #[test]
    fn test_identifier_separator_is_decoded() {
        let raw = RawQuery::parse("subject%3Aidentifier=urn%3Ans%7CP-1");
        assert_eq!(raw.get("subject:identifier"), Some("urn:ns|P-1"));
    }

    #[test]
    fn test_query_string_roundtrip() {
        let raw = RawQuery::from_pairs([("given", "Anna Lee"), ("_count", "5")]);
        assert_eq!(RawQuery::parse(&raw.to_query_string()), raw);
    }
}
