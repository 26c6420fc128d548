//! `_sort` translation.
//!
//! Every specification ends with the resource's tie-breaker so that the
//! ordering is total and keyset pagination can resume from any row.

use crate::error::SearchError;
use crate::registry::{ResourceDescriptorSet, SORT_PARAM};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Parameter name as written in `_sort`; the tie-breaker uses its field name.
    pub parameter: String,
    pub field: String,
    pub direction: SortDirection,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{}", self.parameter),
            SortDirection::Desc => write!(f, "-{}", self.parameter),
        }
    }
}

/// Ordered sort keys, always terminated by the tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpecification {
    keys: Vec<SortKey>,
}

impl SortSpecification {
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Keys before the tie-breaker.
    pub fn business_keys(&self) -> &[SortKey] {
        &self.keys[..self.keys.len().saturating_sub(1)]
    }

    pub fn tie_breaker(&self) -> Option<&SortKey> {
        self.keys.last()
    }
}

/// Translate a `_sort` value, e.g. `-issued,family`.
pub fn parse_sort(
    sort: &str,
    set: &ResourceDescriptorSet,
) -> Result<SortSpecification, SearchError> {
    let mut keys = Vec::new();
    for token in sort.split(',').map(str::trim) {
        let (name, direction) = match token.strip_prefix('-') {
            Some(name) => (name, SortDirection::Desc),
            None => (token, SortDirection::Asc),
        };
        let field = set
            .get(name)
            .filter(|d| d.sortable)
            .and_then(|d| d.target.sort_field())
            .ok_or_else(|| {
                SearchError::invalid_parameter(
                    SORT_PARAM,
                    format!("{SORT_PARAM} cannot sort by \"{token}\" in \"{sort}\""),
                )
            })?;
        keys.push(SortKey {
            parameter: name.to_string(),
            field: field.to_string(),
            direction,
        });
    }
    Ok(with_tie_breaker(keys, set))
}

/// The ordering used when `_sort` is absent.
pub fn default_sort(set: &ResourceDescriptorSet) -> Result<SortSpecification, SearchError> {
    match &set.base.default_sort {
        Some(sort) => parse_sort(sort, set),
        None => Ok(with_tie_breaker(Vec::new(), set)),
    }
}

fn with_tie_breaker(mut keys: Vec<SortKey>, set: &ResourceDescriptorSet) -> SortSpecification {
    keys.push(SortKey {
        parameter: set.base.tie_breaker.clone(),
        field: set.base.tie_breaker.clone(),
        direction: SortDirection::Desc,
    });
    SortSpecification { keys }
}
