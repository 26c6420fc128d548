mod cli;
mod commands;
mod output;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use clinfhir_search::settings::loader::load_settings;
use clinfhir_search::{SearchEngine, SearchSettings, default_registry};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let settings = load_settings(cli.config.as_deref())?;
    init_tracing(&settings);

    let engine = SearchEngine::new(Arc::new(default_registry(&settings)));

    match &cli.command {
        Commands::Explain(args) => {
            commands::search::explain(&engine, &args.resource_type, &args.query, format)?;
        }
        Commands::Search(args) => {
            commands::search::search(
                &engine,
                &args.resource_type,
                &args.query,
                &args.data,
                format,
            )
            .await?;
        }
        Commands::Params(args) => {
            commands::inspect::params(engine.registry(), args.resource_type.as_deref(), format)?;
        }
        Commands::Cursor(args) => {
            commands::inspect::cursor(&args.token, format)?;
        }
        Commands::Settings => {
            commands::inspect::settings(&settings, format)?;
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the configured level.
fn init_tracing(settings: &SearchSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
