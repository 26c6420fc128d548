use anyhow::{Context, Result};
use clinfhir_search::cursor::decode as decode_cursor;
use clinfhir_search::{
    ResourceDescriptorSet, SearchParameterDescriptor, SearchRegistry, SearchSettings,
};
use colored::Colorize;
use serde_json::{Value, json};

use crate::cli::OutputFormat;
use crate::output::{print_json, print_table, sql_value_to_json};

pub fn params(
    registry: &SearchRegistry,
    resource_type: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let sets: Vec<&ResourceDescriptorSet> = match resource_type {
        Some(resource_type) => vec![registry.describe(resource_type)?],
        None => registry
            .resource_types()
            .filter_map(|rt| registry.describe(rt).ok())
            .collect(),
    };

    match format {
        OutputFormat::Json => {
            let resources: Vec<Value> = sets
                .iter()
                .map(|set| {
                    json!({
                        "resourceType": set.resource_type,
                        "table": set.table,
                        "defaultCount": set.base.default_count,
                        "maxCount": set.base.max_count,
                        "defaultSort": set.base.default_sort,
                        "required": set.base.required,
                        "include": set.base.includes,
                        "filter": set.base.filter,
                        "accepted": set.accepted_parameters(registry.cursor_param()),
                        "parameters": set.descriptors().map(descriptor_json).collect::<Vec<_>>(),
                    })
                })
                .collect();
            print_json(&Value::Array(resources))?;
        }
        OutputFormat::Table => {
            for set in sets {
                println!(
                    "{} {} ({})",
                    "Resource:".cyan(),
                    set.resource_type,
                    set.table
                );
                print_table(
                    &["Name", "Type", "Modifiers", "Sortable", "Fields", "Description"],
                    set.descriptors().map(|d| {
                        [
                            d.name.clone(),
                            d.kind.to_string(),
                            join(d.modifiers.iter().map(|m| m.to_string())),
                            if d.sortable { "yes" } else { "" }.to_string(),
                            d.target.fields().join(", "),
                            d.description.clone(),
                        ]
                    }),
                );
                if !set.base.required.is_empty() {
                    println!("{} {}", "Required:".cyan(), set.base.required.join(", "));
                }
            }
        }
    }
    Ok(())
}

fn descriptor_json(descriptor: &SearchParameterDescriptor) -> Value {
    json!({
        "name": descriptor.name,
        "type": descriptor.kind.as_str(),
        "modifiers": descriptor.modifiers.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        "sortable": descriptor.sortable,
        "fields": descriptor.target.fields(),
        "identityLookup": descriptor.identity_lookup,
        "description": descriptor.description,
    })
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

pub fn cursor(token: &str, format: OutputFormat) -> Result<()> {
    let payload = decode_cursor(token).context("decoding continuation token")?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "version": payload.version,
            "resourceType": payload.resource_type,
            "query": payload.query.to_query_string(),
            "after": {
                "sortValues": payload.after.sort_values.iter().map(sql_value_to_json).collect::<Vec<_>>(),
                "tieBreaker": sql_value_to_json(&payload.after.tie_breaker),
            },
        }))?,
        OutputFormat::Table => {
            println!("{} {}", "Version:".cyan(), payload.version);
            println!("{} {}", "Resource:".cyan(), payload.resource_type);
            println!("{} {}", "Query:".cyan(), payload.query.to_query_string());
            println!(
                "{} {}",
                "After:".cyan(),
                join(payload.after.sort_values.iter().map(|v| v.to_string()))
            );
            println!("{} {}", "Tie-breaker:".cyan(), payload.after.tie_breaker);
        }
    }
    Ok(())
}

pub fn settings(settings: &SearchSettings, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(settings)?),
        OutputFormat::Table => {
            print!("{}", toml::to_string_pretty(settings)?);
            Ok(())
        }
    }
}
