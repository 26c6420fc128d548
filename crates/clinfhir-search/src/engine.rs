use crate::condition::{Record, SearchCondition};
use crate::cursor::{self, CursorError, continuation_condition};
use crate::error::SearchError;
use crate::predicate::build_query_condition;
use crate::query::{NormalizedQuery, RawQuery};
use crate::registry::SearchRegistry;
use crate::sort::SortSpecification;
use crate::validation::{SearchIssue, validate_query};
use async_trait::async_trait;
use clinfhir_core::CoreError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("search request rejected with {} issue(s)", .0.len())]
    Validation(Vec<SearchIssue>),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),
    #[error("data source error: {0}")]
    DataSource(#[from] DataSourceError),
}

impl From<SearchError> for EngineError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Core(core) => Self::Core(core),
            other => Self::Validation(other.issues()),
        }
    }
}

impl EngineError {
    /// Issues to render in an OperationOutcome.
    pub fn issues(&self) -> &[SearchIssue] {
        match self {
            Self::Validation(issues) => issues,
            _ => &[],
        }
    }

    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Core(core) => core.is_client_error(),
            Self::Cursor(_) | Self::DataSource(_) => false,
        }
    }
}

/// What a data source is asked to fetch for one page.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub resource_type: String,
    pub table: String,
    /// Search predicate; `total` counts rows matching this alone
    pub filter: SearchCondition,
    /// Keyset predicate resuming after the previous page
    pub continuation: Option<SearchCondition>,
    pub sort: SortSpecification,
    pub limit: usize,
    pub offset: usize,
    pub includes: Vec<String>,
}

impl FetchRequest {
    /// Predicate selecting the rows of this page.
    pub fn page_condition(&self) -> SearchCondition {
        match &self.continuation {
            Some(continuation) => {
                SearchCondition::and(vec![self.filter.clone(), continuation.clone()])
            }
            None => self.filter.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult<R> {
    /// Rows matching the filter, ignoring pagination
    pub total: usize,
    pub rows: Vec<R>,
    /// Whether rows exist after the last one returned
    pub has_more: bool,
}

/// Backend executing translated searches.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Row: Record + Send;

    async fn fetch(
        &self,
        request: &FetchRequest,
    ) -> Result<FetchResult<Self::Row>, DataSourceError>;
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage<R> {
    pub total: usize,
    pub entries: Vec<R>,
    /// Token for the next page, absent on the last page
    pub next_cursor: Option<String>,
}

/// A validated search and the fetch it translates to.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub query: NormalizedQuery,
    pub request: FetchRequest,
}

#[derive(Debug, Clone)]
pub struct SearchEngine {
    registry: Arc<SearchRegistry>,
}

impl SearchEngine {
    pub fn new(registry: Arc<SearchRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SearchRegistry {
        &self.registry
    }

    /// Validate a request and translate it without executing it.
    pub fn plan(&self, resource_type: &str, raw: &RawQuery) -> Result<SearchPlan, EngineError> {
        let query = validate_query(&self.registry, resource_type, raw)?;
        let set = self.registry.describe(resource_type)?;
        let filter = build_query_condition(&query, set).map_err(EngineError::Validation)?;
        let continuation = query
            .after
            .as_ref()
            .map(|after| continuation_condition(after, &query.sort));

        let request = FetchRequest {
            resource_type: set.resource_type.clone(),
            table: set.table.clone(),
            filter,
            continuation,
            sort: query.sort.clone(),
            limit: query.count,
            offset: query.offset(),
            includes: query.includes.clone(),
        };
        Ok(SearchPlan { query, request })
    }

    pub async fn search<S>(
        &self,
        source: &S,
        resource_type: &str,
        raw: &RawQuery,
    ) -> Result<SearchPage<S::Row>, EngineError>
    where
        S: DataSource + ?Sized,
    {
        let plan = self.plan(resource_type, raw)?;
        tracing::debug!(
            resource_type,
            limit = plan.request.limit,
            offset = plan.request.offset,
            resuming = plan.query.after.is_some(),
            "executing search"
        );

        let result = source.fetch(&plan.request).await?;
        let next_cursor = match result.rows.last() {
            Some(last) if result.has_more => Some(cursor::mint(&plan.query, last)?),
            _ => None,
        };

        Ok(SearchPage {
            total: result.total,
            entries: result.rows,
            next_cursor,
        })
    }
}
