use std::fs;

use anyhow::{Context, Result, bail};
use clinfhir_db_memory::InMemorySource;
use clinfhir_search::{
    EngineError, RawQuery, SearchEngine, SearchPlan, SqlBuilder, suggested_status,
};
use colored::Colorize;
use serde_json::{Value, json};

use crate::cli::OutputFormat;
use crate::output::{print_issues, print_json, print_rows, row_to_json, sql_value_to_json};

pub fn explain(
    engine: &SearchEngine,
    resource_type: &str,
    query: &str,
    format: OutputFormat,
) -> Result<()> {
    let raw = RawQuery::parse(query);
    let plan = match engine.plan(resource_type, &raw) {
        Ok(plan) => plan,
        Err(err) => return rejected(err, format),
    };
    let SearchPlan { query, request } = &plan;

    let page = SqlBuilder::for_request(request).build()?;
    let count = SqlBuilder::new(&request.table)
        .where_condition(request.filter.clone())
        .build_count()?;
    let sort: Vec<String> = request.sort.keys().iter().map(|k| k.to_string()).collect();

    match format {
        OutputFormat::Json => print_json(&json!({
            "resourceType": request.resource_type,
            "query": query.canonical().to_query_string(),
            "sort": sort,
            "limit": request.limit,
            "offset": request.offset,
            "resuming": query.after.is_some(),
            "sql": page.sql,
            "params": page.params.iter().map(sql_value_to_json).collect::<Vec<_>>(),
            "countSql": count.sql,
            "countParams": count.params.iter().map(sql_value_to_json).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Table => {
            println!("{} {}", "Resource:".cyan(), request.resource_type);
            println!("{} {}", "Query:".cyan(), query.canonical().to_query_string());
            println!("{} {}", "Sort:".cyan(), sort.join(", "));
            println!("{} {}", "SQL:".cyan(), page.sql);
            for (i, param) in page.params.iter().enumerate() {
                println!("  ${} = {}", i + 1, param);
            }
            println!("{} {}", "Count SQL:".cyan(), count.sql);
        }
    }
    Ok(())
}

pub async fn search(
    engine: &SearchEngine,
    resource_type: &str,
    query: &str,
    data: &str,
    format: OutputFormat,
) -> Result<()> {
    let source = load_source(data)?;
    let raw = RawQuery::parse(query);
    let page = match engine.search(&source, resource_type, &raw).await {
        Ok(page) => page,
        Err(err) => return rejected(err, format),
    };

    match format {
        OutputFormat::Json => {
            let mut bundle = json!({
                "resourceType": "Bundle",
                "type": "searchset",
                "total": page.total,
                "entry": page
                    .entries
                    .iter()
                    .map(|row| json!({ "resource": row_to_json(row) }))
                    .collect::<Vec<_>>(),
            });
            if let Some(token) = &page.next_cursor {
                let next = RawQuery::from_pairs([(engine.registry().cursor_param(), token.as_str())]);
                bundle["link"] = json!([{
                    "relation": "next",
                    "url": format!("{resource_type}?{}", next.to_query_string()),
                }]);
            }
            print_json(&bundle)?;
        }
        OutputFormat::Table => {
            print_rows(&page.entries);
            println!("Total: {}", page.total);
            if let Some(token) = &page.next_cursor {
                println!("{} {}", "Next:".cyan(), token);
            }
        }
    }
    Ok(())
}

/// Load `{ "<table>": [ {row}, ... ] }` into a fresh in-memory source.
fn load_source(path: &str) -> Result<InMemorySource> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let value: Value = serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    let Value::Object(tables) = value else {
        bail!("{path} must hold an object of table name to rows");
    };

    let source = InMemorySource::new();
    for (table, rows) in &tables {
        source.create_table(table);
        let Some(rows) = rows.as_array() else {
            bail!("table \"{table}\" must be an array of rows");
        };
        for (i, row) in rows.iter().enumerate() {
            source
                .insert_json(table, row)
                .with_context(|| format!("{table}[{i}]"))?;
        }
        tracing::debug!(table, rows = rows.len(), "loaded table");
    }
    Ok(source)
}

fn rejected(err: EngineError, format: OutputFormat) -> Result<()> {
    let issues = err.issues();
    if issues.is_empty() {
        return Err(err.into());
    }
    print_issues(issues, format)?;
    bail!(
        "search rejected with {} issue(s) (HTTP {})",
        issues.len(),
        suggested_status(issues)
    )
}
