//! In-memory data source for ClinFHIR search.
//!
//! Executes [`FetchRequest`]s produced by [`SearchEngine::plan`] against rows
//! held in a [`DashMap`], mirroring the ordering and paging the SQL
//! renderer produces. Used by tests and the CLI.
//!
//! # Example
//!
//! ```ignore
//! use clinfhir_db_memory::{InMemorySource, Row};
//! use clinfhir_search::{RawQuery, SearchEngine, SearchSettings, default_registry};
//!
//! let source = InMemorySource::new();
//! source.insert("patients", Row::new("p1").with("first_name", "Anna"));
//!
//! let engine = SearchEngine::new(default_registry(&SearchSettings::default()).into());
//! let page = engine.search(&source, "Patient", &RawQuery::parse("given=ann")).await?;
//! ```
//!
//! [`FetchRequest`]: clinfhir_search::FetchRequest
//! [`SearchEngine::plan`]: clinfhir_search::SearchEngine::plan
//! [`DashMap`]: dashmap::DashMap

pub mod query;
pub mod row;
pub mod storage;

pub use row::{Row, RowError, RowValue};
pub use storage::InMemorySource;
