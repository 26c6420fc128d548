//! FHIR search translation for ClinFHIR.
//!
//! Turns FHIR search query parameters into backend-neutral predicates,
//! validates them against per-resource parameter descriptors and pages
//! through results with opaque keyset continuation tokens.
//!
//! ## Flow
//!
//! 1. [`RawQuery::parse`] reads the URL query string.
//! 2. [`validate_query`] checks it against the [`SearchRegistry`] and yields a
//!    [`NormalizedQuery`], or every [`SearchIssue`] found.
//! 3. [`build_query_condition`] and [`parse_sort`] translate it into a
//!    [`SearchCondition`] and a [`SortSpecification`].
//! 4. [`SearchEngine::search`] runs it against a [`DataSource`] and mints the
//!    next continuation token.

pub mod condition;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod filter;
pub mod operators;
pub mod outcome;
pub mod parameters;
pub mod predicate;
pub mod query;
pub mod registry;
pub mod resources;
pub mod settings;
pub mod sort;
pub mod sql;
pub mod validation;

pub use condition::{Operator, Record, SearchCondition, SqlValue};
pub use cursor::{AfterKey, CursorError, CursorPayload, build_continuation_condition};
pub use engine::{
    DataSource, DataSourceError, EngineError, FetchRequest, FetchResult, SearchEngine,
    SearchPage, SearchPlan,
};
pub use error::SearchError;
pub use filter::{FilterError, FilterExpression, parse_filter};
pub use operators::{MatchOperator, resolve_operator};
pub use outcome::{operation_outcome, suggested_status};
pub use parameters::{SearchModifier, SearchParameterType};
pub use predicate::{build_field_condition, build_query_condition};
pub use query::{NormalizedParam, NormalizedQuery, RawQuery};
pub use registry::{
    BaseParameters, FieldTarget, ResourceDescriptorSet, SearchParameterDescriptor, SearchRegistry,
    ValidationRule,
};
pub use resources::default_registry;
pub use settings::SearchSettings;
pub use sort::{SortDirection, SortKey, SortSpecification, parse_sort};
pub use sql::{BuiltQuery, SqlBuilder, SqlBuilderError};
pub use validation::{IssueCode, SearchIssue, validate_query};
