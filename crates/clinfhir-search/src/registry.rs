//! Search parameter descriptors and the per-resource registry.
//!
//! A [`SearchRegistry`] is assembled once at startup from
//! [`ResourceDescriptorSet`]s and is read-only afterwards; share it behind an
//! `Arc` between request handlers.

use crate::condition::{SearchCondition, SqlValue};
use crate::error::SearchError;
use crate::operators::MatchOperator;
use crate::parameters::{SearchModifier, SearchParameterType, split_name_and_modifier};
use clinfhir_core::{CoreError, FhirDate, decode_identifier, is_valid_identifier};
use indexmap::IndexMap;
use regex::Regex;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Name of the page-size parameter.
pub const COUNT_PARAM: &str = "_count";
/// Name of the zero-based offset page parameter.
pub const PAGE_PARAM: &str = "_page";
/// Name of the sort parameter.
pub const SORT_PARAM: &str = "_sort";
/// Name of the include parameter.
pub const INCLUDE_PARAM: &str = "_include";
/// Name of the filter expression parameter.
pub const FILTER_PARAM: &str = "_filter";

/// Coerce a raw query value into the typed value the predicate compares against.
pub type ValueTransform = fn(&str) -> Result<SqlValue, String>;

/// Choose the match operator from the coerced value, bypassing modifiers.
pub type OperatorOverride = fn(&SqlValue) -> MatchOperator;

/// Build the whole predicate for a parameter occurrence.
pub type ConditionOverride =
    fn(&FieldTarget, &SqlValue, MatchOperator, Option<SearchModifier>) -> SearchCondition;

/// A custom validation test for raw values.
pub type CustomTest = fn(&str) -> Result<(), String>;

/// Storage field(s) a parameter maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    Single(String),
    /// Match if any of the fields matches.
    AnyOf(Vec<String>),
}

impl FieldTarget {
    pub fn single(field: impl Into<String>) -> Self {
        Self::Single(field.into())
    }

    pub fn any_of<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Self::Single(field) => std::slice::from_ref(field),
            Self::AnyOf(fields) => fields,
        }
    }

    /// Field used when sorting by this parameter.
    pub fn sort_field(&self) -> Option<&str> {
        self.fields().first().map(String::as_str)
    }
}

/// Validation applied to a raw parameter value before coercion.
#[derive(Debug, Clone)]
pub enum ValidationRule {
    Any,
    OneOf(Vec<String>),
    Pattern { regex: Regex, message: String },
    Date,
    Boolean,
    NamespacedIdentifier { namespace: String },
    Custom(CustomTest),
}

impl ValidationRule {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Check a raw value; the error is the user-facing message.
    pub fn check(&self, key: &str, raw: &str) -> Result<(), String> {
        match self {
            Self::Any => Ok(()),
            Self::OneOf(allowed) => {
                if allowed.iter().any(|a| a == raw) {
                    Ok(())
                } else {
                    Err(one_of_message(key, allowed))
                }
            }
            Self::Pattern { regex, message } => {
                if regex.is_match(raw) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
            Self::Date => raw
                .parse::<FhirDate>()
                .map(|_| ())
                .map_err(|_| format!("Invalid date/time format: {raw}")),
            Self::Boolean => match raw {
                "true" | "false" => Ok(()),
                _ => Err(format!("{key} must be one of the following values: true, false")),
            },
            Self::NamespacedIdentifier { namespace } => {
                let (ns, value) = decode_identifier(raw);
                if is_valid_identifier(ns, value, namespace) {
                    Ok(())
                } else {
                    Err(format!("{key} must be in the format \"<namespace>|<id>\""))
                }
            }
            Self::Custom(test) => test(raw),
        }
    }
}

pub(crate) fn one_of_message(key: &str, allowed: &[String]) -> String {
    format!(
        "{key} must be one of the following values: {}",
        allowed.join(", ")
    )
}

/// Run a descriptor hook, turning a panic into an error message.
pub(crate) fn guarded<T>(hook: impl FnOnce() -> Result<T, String>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown failure".to_string());
            tracing::warn!(error = %message, "search parameter hook panicked");
            Err(message)
        }
    }
}

/// Everything the translation layer knows about one search parameter.
#[derive(Debug, Clone)]
pub struct SearchParameterDescriptor {
    /// Query key, e.g. `given` or `subject:identifier`
    pub name: String,
    pub kind: SearchParameterType,
    pub target: FieldTarget,
    /// Modifiers honoured for this parameter
    pub modifiers: Vec<SearchModifier>,
    pub sortable: bool,
    pub rule: ValidationRule,
    pub transform: Option<ValueTransform>,
    pub resolve_operator: Option<OperatorOverride>,
    pub build_condition: Option<ConditionOverride>,
    /// Resolve through an exact identity lookup ahead of other predicates.
    pub identity_lookup: bool,
    pub description: String,
}

impl SearchParameterDescriptor {
    /// Create a descriptor with no modifiers, no hooks and no validation.
    pub fn new(name: impl Into<String>, kind: SearchParameterType, target: FieldTarget) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
            modifiers: Vec::new(),
            sortable: false,
            rule: ValidationRule::Any,
            transform: None,
            resolve_operator: None,
            build_condition: None,
            identity_lookup: false,
            description: String::new(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: &[SearchModifier]) -> Self {
        self.modifiers = modifiers.to_vec();
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_operator_override(mut self, hook: OperatorOverride) -> Self {
        self.resolve_operator = Some(hook);
        self
    }

    pub fn with_condition_override(mut self, hook: ConditionOverride) -> Self {
        self.build_condition = Some(hook);
        self
    }

    pub fn identity_lookup(mut self) -> Self {
        self.identity_lookup = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Coerce a raw value, using the transform hook when present.
    pub fn coerce(&self, raw: &str) -> Result<SqlValue, String> {
        if let Some(transform) = self.transform {
            return transform(raw);
        }
        match self.kind {
            SearchParameterType::String | SearchParameterType::Token => {
                Ok(SqlValue::text(raw))
            }
            SearchParameterType::Date => raw
                .parse::<FhirDate>()
                .map(|date| SqlValue::Date(date.to_string()))
                .map_err(|_| format!("Invalid date/time format: {raw}")),
        }
    }
}

/// Parameters every resource understands besides its own descriptors.
#[derive(Debug, Clone)]
pub struct BaseParameters {
    pub default_count: usize,
    pub max_count: usize,
    /// Applied when `_sort` is absent, e.g. `-issued`
    pub default_sort: Option<String>,
    /// Unique field appended to every sort
    pub tie_breaker: String,
    /// Keys that must be present in every query
    pub required: Vec<String>,
    /// Allowed `_include` values; empty means `_include` is not supported
    pub includes: Vec<String>,
    /// Whether `_filter` is accepted
    pub filter: bool,
}

impl Default for BaseParameters {
    fn default() -> Self {
        Self {
            default_count: 20,
            max_count: 20,
            default_sort: None,
            tie_breaker: "id".to_string(),
            required: Vec::new(),
            includes: Vec::new(),
            filter: true,
        }
    }
}

/// The searchable surface of one resource type.
#[derive(Debug, Clone)]
pub struct ResourceDescriptorSet {
    pub resource_type: String,
    /// Storage table or collection name
    pub table: String,
    descriptors: IndexMap<String, SearchParameterDescriptor>,
    pub base: BaseParameters,
}

impl ResourceDescriptorSet {
    pub fn new(resource_type: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            table: table.into(),
            descriptors: IndexMap::new(),
            base: BaseParameters::default(),
        }
    }

    pub fn with_base(mut self, base: BaseParameters) -> Self {
        self.base = base;
        self
    }

    pub fn with_parameter(mut self, descriptor: SearchParameterDescriptor) -> Self {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SearchParameterDescriptor> {
        self.descriptors.get(name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SearchParameterDescriptor> {
        self.descriptors.values()
    }

    /// Resolve a query key to its descriptor and raw modifier suffix.
    ///
    /// The full key is tried first so names such as `subject:identifier`
    /// resolve before the key is split on `:`.
    pub fn resolve_key<'k>(
        &self,
        key: &'k str,
    ) -> Option<(&SearchParameterDescriptor, Option<&'k str>)> {
        if let Some(descriptor) = self.descriptors.get(key) {
            return Some((descriptor, None));
        }
        let (name, modifier) = split_name_and_modifier(key);
        self.descriptors.get(name).map(|d| (d, modifier))
    }

    /// Every parameter name accepted by this resource, base parameters first.
    pub fn accepted_parameters(&self, cursor_param: &str) -> Vec<String> {
        let mut names = vec![
            COUNT_PARAM.to_string(),
            PAGE_PARAM.to_string(),
            SORT_PARAM.to_string(),
            cursor_param.to_string(),
        ];
        if !self.base.includes.is_empty() {
            names.push(INCLUDE_PARAM.to_string());
        }
        if self.base.filter {
            names.push(FILTER_PARAM.to_string());
        }
        names.extend(self.descriptors.keys().cloned());
        names
    }
}

/// Read-only lookup of descriptor sets by resource type.
#[derive(Debug, Clone)]
pub struct SearchRegistry {
    resources: IndexMap<String, ResourceDescriptorSet>,
    cursor_param: String,
}

impl SearchRegistry {
    pub fn new(cursor_param: impl Into<String>) -> Self {
        Self {
            resources: IndexMap::new(),
            cursor_param: cursor_param.into(),
        }
    }

    pub fn with_resource(mut self, set: ResourceDescriptorSet) -> Self {
        tracing::debug!(
            resource_type = %set.resource_type,
            parameters = set.descriptors.len(),
            "registering search parameters"
        );
        self.resources.insert(set.resource_type.clone(), set);
        self
    }

    /// Name of the continuation token parameter.
    pub fn cursor_param(&self) -> &str {
        &self.cursor_param
    }

    pub fn describe(&self, resource_type: &str) -> Result<&ResourceDescriptorSet, SearchError> {
        self.resources
            .get(resource_type)
            .ok_or_else(|| CoreError::unknown_resource_type(resource_type).into())
    }

    pub fn lookup(&self, resource_type: &str, name: &str) -> Option<&SearchParameterDescriptor> {
        self.resources.get(resource_type)?.get(name)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}
