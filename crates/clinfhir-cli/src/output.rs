use crate::cli::OutputFormat;
use anyhow::Result;
use clinfhir_db_memory::Row;
use clinfhir_search::{SearchIssue, SqlValue, operation_outcome};
use colored::Colorize;
use serde_json::{Map, Value};
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_table<I, R>(header: &[&str], records: I)
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut builder = Builder::default();
    builder.push_record(header.iter().map(|h| h.to_string()));
    for record in records {
        builder.push_record(record);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

/// Print rejected-search issues, as an OperationOutcome or a table.
pub fn print_issues(issues: &[SearchIssue], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&operation_outcome(issues))?,
        OutputFormat::Table => print_table(
            &["Parameter", "Code", "Message"],
            issues.iter().map(|issue| {
                [
                    issue.parameter.clone(),
                    issue.code.as_str().to_string(),
                    issue.message.clone(),
                ]
            }),
        ),
    }
    Ok(())
}

pub fn sql_value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Text(s) | SqlValue::Date(s) => Value::String(s.clone()),
        SqlValue::Integer(i) => Value::from(*i),
        SqlValue::Boolean(b) => Value::Bool(*b),
        SqlValue::Null => Value::Null,
    }
}

pub fn row_to_json(row: &Row) -> Value {
    let object: Map<String, Value> = row
        .fields()
        .map(|(path, value)| (path.to_string(), sql_value_to_json(value)))
        .collect();
    Value::Object(object)
}

pub fn print_rows(rows: &[Row]) {
    if rows.is_empty() {
        println!("No rows found.");
        return;
    }
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for (path, _) in row.fields() {
            if !columns.contains(&path) {
                columns.push(path);
            }
        }
    }
    let records = rows.iter().map(|row| {
        let fields: Vec<(&str, &SqlValue)> = row.fields().collect();
        columns
            .iter()
            .map(|column| {
                fields
                    .iter()
                    .find(|(path, _)| path == column)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| "-".to_string())
            })
            .collect::<Vec<_>>()
    });
    print_table(&columns, records);
}
