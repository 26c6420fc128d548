use crate::query::{select_page, sort_rows};
use crate::row::{Row, RowError};
use async_trait::async_trait;
use clinfhir_search::{DataSource, DataSourceError, FetchRequest, FetchResult};
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory data source keyed by table name.
///
/// Evaluates translated searches with [`SearchCondition::matches`] and the
/// same ordering rules the SQL renderer emits.
///
/// [`SearchCondition::matches`]: clinfhir_search::SearchCondition::matches
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tables: Arc<DashMap<String, Vec<Row>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty table; fetching from an unregistered table fails.
    pub fn create_table(&self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    pub fn insert(&self, table: &str, row: Row) {
        tracing::trace!(table, id = row.id(), "inserting row");
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn insert_json(&self, table: &str, value: &serde_json::Value) -> Result<(), RowError> {
        self.insert(table, Row::from_json(value)?);
        Ok(())
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map(|rows| rows.len()).unwrap_or(0)
    }

    fn execute(&self, request: &FetchRequest) -> Result<FetchResult<Row>, DataSourceError> {
        let rows = self
            .tables
            .get(&request.table)
            .ok_or_else(|| DataSourceError::UnknownTable(request.table.clone()))?;

        let matching: Vec<Row> = rows
            .iter()
            .filter(|row| request.filter.matches(*row))
            .cloned()
            .collect();
        drop(rows);

        let total = matching.len();
        let mut page_rows: Vec<Row> = match &request.continuation {
            Some(continuation) => matching
                .into_iter()
                .filter(|row| continuation.matches(row))
                .collect(),
            None => matching,
        };
        sort_rows(&mut page_rows, &request.sort);

        let (rows, has_more) = select_page(page_rows, request.offset, request.limit);
        tracing::debug!(
            table = %request.table,
            total,
            returned = rows.len(),
            has_more,
            "in-memory fetch"
        );
        Ok(FetchResult {
            total,
            rows,
            has_more,
        })
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    type Row = Row;

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult<Row>, DataSourceError> {
        self.execute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinfhir_search::{RawQuery, SearchEngine, SearchSettings, default_registry};

    fn engine() -> SearchEngine {
        SearchEngine::new(Arc::new(default_registry(&SearchSettings::default())))
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let source = InMemorySource::new();
        let plan = engine().plan("Patient", &RawQuery::new()).unwrap();
        let err = source.fetch(&plan.request).await.unwrap_err();
        assert!(matches!(err, DataSourceError::UnknownTable(t) if t == "patients"));
    }

    #[tokio::test]
    async fn test_total_ignores_pagination() {
        let source = InMemorySource::new();
        for i in 0..5 {
            source.insert("patients", Row::new(format!("p{i}")).with("sex", "female"));
        }
        source.insert("patients", Row::new("m1").with("sex", "male"));

        let page = engine()
            .search(&source, "Patient", &RawQuery::parse("gender=female&_count=2"))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.entries.len(), 2);
        assert!(page.next_cursor.is_some());
        assert_eq!(source.count("patients"), 6);
    }
}
