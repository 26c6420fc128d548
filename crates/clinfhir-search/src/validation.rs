//! Request validation.
//!
//! Every problem in a request is collected before anything is rejected, so
//! the client sees all of its mistakes in one response.

use crate::cursor;
use crate::error::SearchError;
use crate::filter::parse_filter;
use crate::parameters::SearchModifier;
use crate::predicate::build_query_condition;
use crate::query::{NormalizedParam, NormalizedQuery, RawQuery};
use crate::registry::{
    COUNT_PARAM, FILTER_PARAM, INCLUDE_PARAM, PAGE_PARAM, ResourceDescriptorSet, SORT_PARAM,
    SearchRegistry, guarded, one_of_message,
};
use crate::sort::{default_sort, parse_sort};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Issue classification, mirroring the FHIR `issue-type` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    NotSupported,
    Invalid,
    Required,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSupported => "not-supported",
            Self::Invalid => "invalid",
            Self::Required => "required",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single problem with a search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIssue {
    /// Query key the issue is about
    pub parameter: String,
    pub code: IssueCode,
    pub message: String,
}

impl SearchIssue {
    pub fn not_supported(parameter: impl Into<String>) -> Self {
        let parameter = parameter.into();
        Self {
            message: format!("parameter is not supported: {parameter}"),
            parameter,
            code: IssueCode::NotSupported,
        }
    }

    pub fn invalid(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            code: IssueCode::Invalid,
            message: message.into(),
        }
    }

    pub fn required(parameter: impl Into<String>) -> Self {
        let parameter = parameter.into();
        Self {
            message: format!("{parameter} is a required field"),
            parameter,
            code: IssueCode::Required,
        }
    }
}

impl fmt::Display for SearchIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Validate a raw request against the registry.
///
/// When the continuation parameter is present the embedded query is
/// validated instead, and no other parameter except an unchanged `_count`
/// may accompany it.
pub fn validate_query(
    registry: &SearchRegistry,
    resource_type: &str,
    raw: &RawQuery,
) -> Result<NormalizedQuery, SearchError> {
    let set = registry.describe(resource_type)?;
    let cursor_param = registry.cursor_param();

    let result = match raw.get(cursor_param) {
        Some(token) => validate_continuation(set, cursor_param, token, raw),
        None => validate_params(set, cursor_param, raw),
    };

    result.map_err(|issues| {
        tracing::debug!(
            resource_type,
            issues = issues.len(),
            "search request failed validation"
        );
        SearchError::Validation(issues)
    })
}

fn validate_continuation(
    set: &ResourceDescriptorSet,
    cursor_param: &str,
    token: &str,
    raw: &RawQuery,
) -> Result<NormalizedQuery, Vec<SearchIssue>> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    let accepted = set.accepted_parameters(cursor_param);
    let mut count = None;
    for (key, value) in raw.iter() {
        let first = seen.insert(key);
        if key == cursor_param {
            if !first {
                issues.push(duplicate(key));
            }
        } else if !accepted.iter().any(|name| name == key) && set.resolve_key(key).is_none() {
            if first {
                issues.push(SearchIssue::not_supported(key));
            }
        } else if key == COUNT_PARAM {
            if !first {
                issues.push(duplicate(key));
            } else {
                match parse_count(value, set.base.max_count) {
                    Ok(n) => count = Some(n),
                    Err(message) => issues.push(SearchIssue::invalid(key, message)),
                }
            }
        } else {
            issues.push(SearchIssue::invalid(
                key,
                format!("{key} cannot be combined with {cursor_param}"),
            ));
        }
    }

    let invalid_token = || {
        SearchIssue::invalid(
            cursor_param,
            format!("{cursor_param} is not a valid continuation token"),
        )
    };

    let payload = match cursor::decode(token) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(error = %err, "rejected continuation token");
            issues.push(invalid_token());
            return Err(issues);
        }
    };

    if payload.resource_type != set.resource_type {
        issues.push(invalid_token());
    }
    if !issues.is_empty() {
        return Err(issues);
    }

    let mut query = validate_params(set, cursor_param, &payload.query)?;
    if payload.after.sort_values.len() != query.sort.business_keys().len() {
        return Err(vec![invalid_token()]);
    }
    if let Some(count) = count
        && count != query.count
    {
        return Err(vec![SearchIssue::invalid(
            COUNT_PARAM,
            format!("{COUNT_PARAM} cannot be changed while paging with {cursor_param}"),
        )]);
    }
    query.after = Some(payload.after);
    Ok(query)
}

fn validate_params(
    set: &ResourceDescriptorSet,
    cursor_param: &str,
    raw: &RawQuery,
) -> Result<NormalizedQuery, Vec<SearchIssue>> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    let mut params = Vec::new();
    let mut count = set.base.default_count;
    let mut count_raw = None;
    let mut page = 0;
    let mut sort = None;
    let mut sort_raw = None;
    let mut includes = Vec::new();
    let mut filter = None;
    let mut filter_raw = None;

    for (key, value) in raw.iter() {
        let repeatable = key == INCLUDE_PARAM && !set.base.includes.is_empty();
        if !repeatable && !seen.insert(key) {
            issues.push(duplicate(key));
            continue;
        }

        match key {
            COUNT_PARAM => match parse_count(value, set.base.max_count) {
                Ok(n) => {
                    count = n;
                    count_raw = Some(value.to_string());
                }
                Err(message) => issues.push(SearchIssue::invalid(key, message)),
            },
            PAGE_PARAM => match parse_page(value) {
                Ok(n) => page = n,
                Err(message) => issues.push(SearchIssue::invalid(key, message)),
            },
            SORT_PARAM => match parse_sort(value, set) {
                Ok(spec) => {
                    sort = Some(spec);
                    sort_raw = Some(value.to_string());
                }
                Err(_) => issues.push(SearchIssue::invalid(
                    key,
                    one_of_message(key, &sortable_values(set)),
                )),
            },
            INCLUDE_PARAM if !set.base.includes.is_empty() => {
                if set.base.includes.iter().any(|i| i == value) {
                    includes.push(value.to_string());
                } else {
                    let label = format!("{key}[{}]", includes.len() + index_offset(&issues, key));
                    issues.push(SearchIssue::invalid(
                        key,
                        one_of_message(&label, &set.base.includes),
                    ));
                }
            }
            FILTER_PARAM if set.base.filter => match parse_filter(value) {
                Ok(expression) => {
                    filter = Some(expression);
                    filter_raw = Some(value.to_string());
                }
                Err(err) => issues.push(SearchIssue::invalid(key, err.to_string())),
            },
            _ if key == cursor_param => issues.push(SearchIssue::not_supported(key)),
            _ => match set.resolve_key(key) {
                None => issues.push(SearchIssue::not_supported(key)),
                Some((descriptor, modifier)) => {
                    let coerced = guarded(|| {
                        descriptor.rule.check(key, value)?;
                        descriptor.coerce(value)
                    });
                    match coerced {
                        Ok(coerced) => params.push(NormalizedParam {
                            key: key.to_string(),
                            name: descriptor.name.clone(),
                            modifier: modifier.and_then(SearchModifier::parse),
                            raw: value.to_string(),
                            value: coerced,
                        }),
                        Err(message) => issues.push(SearchIssue::invalid(key, message)),
                    }
                }
            },
        }
    }

    for required in &set.base.required {
        if !raw.contains_key(required) {
            issues.push(SearchIssue::required(required));
        }
    }

    let sort = match sort {
        Some(sort) => sort,
        None => match default_sort(set) {
            Ok(sort) => sort,
            Err(err) => {
                issues.extend(err.issues());
                return Err(issues);
            }
        },
    };

    if !issues.is_empty() {
        return Err(issues);
    }

    let query = NormalizedQuery {
        resource_type: set.resource_type.clone(),
        params,
        count,
        page,
        count_raw,
        sort,
        sort_raw,
        includes,
        filter,
        filter_raw,
        after: None,
    };

    // Surface hook failures in the predicate builder as validation issues.
    build_query_condition(&query, set)?;
    Ok(query)
}

fn duplicate(key: &str) -> SearchIssue {
    SearchIssue::invalid(key, format!("{key} may only be specified once"))
}

/// Number of `_include` values already rejected, so labels index every occurrence.
fn index_offset(issues: &[SearchIssue], key: &str) -> usize {
    issues.iter().filter(|i| i.parameter == key).count()
}

fn sortable_values(set: &ResourceDescriptorSet) -> Vec<String> {
    set.descriptors()
        .filter(|d| d.sortable)
        .flat_map(|d| [format!("-{}", d.name), d.name.clone()])
        .collect()
}

fn parse_count(value: &str, max: usize) -> Result<usize, String> {
    let n: i64 = value
        .parse()
        .map_err(|_| format!("{COUNT_PARAM} must be a number"))?;
    if n < 1 {
        return Err(format!("{COUNT_PARAM} must be greater than or equal to 1"));
    }
    let n = usize::try_from(n).unwrap_or(usize::MAX);
    if n > max {
        return Err(format!("{COUNT_PARAM} must be less than or equal to {max}"));
    }
    Ok(n)
}

fn parse_page(value: &str) -> Result<usize, String> {
    let n: i64 = value
        .parse()
        .map_err(|_| format!("{PAGE_PARAM} must be a number"))?;
    usize::try_from(n).map_err(|_| format!("{PAGE_PARAM} must be greater than or equal to 0"))
}
