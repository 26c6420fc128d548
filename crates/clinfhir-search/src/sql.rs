//! SQL rendering for PostgreSQL-backed data sources.
//!
//! Field paths map to columns: `first_name` is a column of the resource
//! table (aliased `r`), `additional_data.city_town` is column `city_town` of
//! the `additional_data` relation, joined on `r.additional_data_id`.
//!
//! All values are bound as `$n` parameters; identifiers are validated and
//! quoted.

use crate::condition::{Operator, SearchCondition, SqlValue};
use crate::engine::FetchRequest;
use crate::sort::SortSpecification;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during SQL building.
#[derive(Debug, Error)]
pub enum SqlBuilderError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

const RESOURCE_ALIAS: &str = "r";

/// Validate an identifier (table name, column name, path segment).
///
/// Only allows alphanumeric characters and underscores.
fn validate_identifier(name: &str) -> Result<(), SqlBuilderError> {
    if name.is_empty() {
        return Err(SqlBuilderError::InvalidIdentifier(
            "Empty identifier".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SqlBuilderError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Escape a PostgreSQL identifier (table name, column name).
pub fn escape_identifier(name: &str) -> Result<String, SqlBuilderError> {
    validate_identifier(name)?;
    Ok(format!("\"{name}\""))
}

/// Escape `\`, `%` and `_` for use inside a LIKE pattern.
pub fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn column(path: &str) -> Result<String, SqlBuilderError> {
    match path.split_once('.') {
        Some((relation, field)) => Ok(format!(
            "{}.{}",
            escape_identifier(relation)?,
            escape_identifier(field)?
        )),
        None => Ok(format!("{RESOURCE_ALIAS}.{}", escape_identifier(path)?)),
    }
}

/// A built SQL query with parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl fmt::Display for BuiltQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// Renders a search into a parameterised SELECT.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    table: String,
    conditions: Vec<SearchCondition>,
    sort: Option<SortSpecification>,
    limit: Option<usize>,
    offset: usize,
}

impl SqlBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            sort: None,
            limit: None,
            offset: 0,
        }
    }

    /// Builder for the page a data source is asked to fetch.
    pub fn for_request(request: &FetchRequest) -> Self {
        Self::new(&request.table)
            .where_condition(request.page_condition())
            .sort_by(request.sort.clone())
            .paginate(request.limit, request.offset)
    }

    pub fn where_condition(mut self, condition: SearchCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn sort_by(mut self, sort: SortSpecification) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    fn condition(&self) -> SearchCondition {
        SearchCondition::and(self.conditions.clone())
    }

    pub fn build(&self) -> Result<BuiltQuery, SqlBuilderError> {
        let condition = self.condition();
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {RESOURCE_ALIAS}.* FROM {}",
            self.build_from_clause(&condition)?
        );
        let where_sql = condition_to_sql(&condition, &mut params)?;
        sql.push_str(&format!(" WHERE {where_sql}"));

        if let Some(order) = self.build_order_clause()? {
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if self.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }
        Ok(BuiltQuery { sql, params })
    }

    /// COUNT over the filter alone, ignoring sort and pagination.
    pub fn build_count(&self) -> Result<BuiltQuery, SqlBuilderError> {
        let condition = self.condition();
        let mut params = Vec::new();
        let from = self.build_from_clause(&condition)?;
        let where_sql = condition_to_sql(&condition, &mut params)?;
        Ok(BuiltQuery {
            sql: format!("SELECT COUNT(*) FROM {from} WHERE {where_sql}"),
            params,
        })
    }

    fn build_from_clause(&self, condition: &SearchCondition) -> Result<String, SqlBuilderError> {
        let mut from = format!("{} AS {RESOURCE_ALIAS}", escape_identifier(&self.table)?);
        let sort_fields = self
            .sort
            .iter()
            .flat_map(|s| s.keys())
            .map(|k| k.field.as_str());
        let mut relations: Vec<&str> = Vec::new();
        for field in condition.fields().into_iter().chain(sort_fields) {
            if let Some((relation, _)) = field.split_once('.')
                && !relations.contains(&relation)
            {
                relations.push(relation);
            }
        }
        for relation in relations {
            let quoted = escape_identifier(relation)?;
            let foreign_key = escape_identifier(&format!("{relation}_id"))?;
            from.push_str(&format!(
                " LEFT JOIN {quoted} ON {quoted}.\"id\" = {RESOURCE_ALIAS}.{foreign_key}"
            ));
        }
        Ok(from)
    }

    fn build_order_clause(&self) -> Result<Option<String>, SqlBuilderError> {
        let Some(sort) = &self.sort else {
            return Ok(None);
        };
        let parts = sort
            .keys()
            .iter()
            .map(|key| {
                Ok(format!(
                    "{} {} NULLS LAST",
                    column(&key.field)?,
                    key.direction.as_sql()
                ))
            })
            .collect::<Result<Vec<_>, SqlBuilderError>>()?;
        Ok(Some(parts.join(", ")))
    }
}

fn condition_to_sql(
    condition: &SearchCondition,
    params: &mut Vec<SqlValue>,
) -> Result<String, SqlBuilderError> {
    match condition {
        SearchCondition::Compare {
            field,
            op,
            value,
            case_insensitive,
        } => {
            let mut accessor = column(field)?;
            if matches!(value, SqlValue::Date(_)) && op.is_pattern() {
                accessor = format!("CAST({accessor} AS TEXT)");
            }
            if *case_insensitive {
                accessor = format!("UPPER({accessor})");
            }

            if op.is_pattern() {
                let escaped = escape_like_pattern(&value.as_display_str());
                let pattern = match op {
                    Operator::Contains => format!("%{escaped}%"),
                    Operator::StartsWith => format!("{escaped}%"),
                    _ => format!("%{escaped}"),
                };
                params.push(SqlValue::Text(pattern));
                Ok(format!("({accessor} LIKE ${} ESCAPE '\\')", params.len()))
            } else {
                params.push(value.clone());
                Ok(format!("({accessor} {} ${})", op.as_sql(), params.len()))
            }
        }

        SearchCondition::IsNull(field) => Ok(format!("({} IS NULL)", column(field)?)),
        SearchCondition::IsNotNull(field) => Ok(format!("({} IS NOT NULL)", column(field)?)),

        SearchCondition::Or(conditions) => {
            if conditions.is_empty() {
                return Ok("FALSE".to_string());
            }
            let parts: Vec<String> = conditions
                .iter()
                .map(|c| condition_to_sql(c, params))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }

        SearchCondition::And(conditions) => {
            if conditions.is_empty() {
                return Ok("TRUE".to_string());
            }
            let parts: Vec<String> = conditions
                .iter()
                .map(|c| condition_to_sql(c, params))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(" AND ")))
        }

        SearchCondition::Not(condition) => {
            let inner = condition_to_sql(condition, params)?;
            Ok(format!("(NOT {inner})"))
        }

        SearchCondition::True => Ok("TRUE".to_string()),
        SearchCondition::False => Ok("FALSE".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::default_registry;
    use crate::settings::SearchSettings;
    use crate::sort::parse_sort;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("first_name").unwrap(), "\"first_name\"");
        assert!(escape_identifier("name; DROP TABLE x").is_err());
        assert!(escape_identifier("").is_err());
    }

    #[test]
    fn test_escape_like_pattern() {
        assert_eq!(escape_like_pattern("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn test_case_insensitive_prefix() {
        let query = SqlBuilder::new("patients")
            .where_condition(SearchCondition::Compare {
                field: "first_name".into(),
                op: Operator::StartsWith,
                value: SqlValue::text("AN_"),
                case_insensitive: true,
            })
            .build()
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT r.* FROM \"patients\" AS r WHERE (UPPER(r.\"first_name\") LIKE $1 ESCAPE '\\')"
        );
        assert_eq!(query.params, vec![SqlValue::text("AN\\_%")]);
    }

    #[test]
    fn test_join_sort_and_pagination() {
        let registry = default_registry(&SearchSettings::default());
        let set = registry.describe("Patient").unwrap();
        let sort = parse_sort("address,-birthdate", set).unwrap();
        let query = SqlBuilder::new("patients")
            .where_condition(SearchCondition::IsNull("date_of_death".into()))
            .sort_by(sort)
            .paginate(20, 40)
            .build()
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT r.* FROM \"patients\" AS r \
             LEFT JOIN \"additional_data\" ON \"additional_data\".\"id\" = r.\"additional_data_id\" \
             WHERE (r.\"date_of_death\" IS NULL) \
             ORDER BY \"additional_data\".\"city_town\" ASC NULLS LAST, \
             r.\"date_of_birth\" DESC NULLS LAST, r.\"id\" DESC NULLS LAST \
             LIMIT 20 OFFSET 40"
        );
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_params_are_numbered_in_order() {
        let condition = SearchCondition::or(vec![
            SearchCondition::eq("sex", SqlValue::text("female")),
            SearchCondition::compare(
                "date_of_birth",
                Operator::StartsWith,
                SqlValue::Date("1990".into()),
            ),
        ]);
        let query = SqlBuilder::new("patients")
            .where_condition(condition)
            .build_count()
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT COUNT(*) FROM \"patients\" AS r WHERE ((r.\"sex\" = $1) OR \
             (CAST(r.\"date_of_birth\" AS TEXT) LIKE $2 ESCAPE '\\'))"
        );
        assert_eq!(
            query.params,
            vec![SqlValue::text("female"), SqlValue::text("1990%")]
        );
    }

    #[test]
    fn test_empty_condition_renders_true() {
        let query = SqlBuilder::new("patients").build().unwrap();
        assert_eq!(query.sql, "SELECT r.* FROM \"patients\" AS r WHERE TRUE");
    }
}
