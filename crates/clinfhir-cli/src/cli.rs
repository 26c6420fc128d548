use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "clinfhir")]
#[command(about = "ClinFHIR search CLI: validate, translate and run FHIR searches")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ./clinfhir.toml when present)
    #[arg(short, long, global = true, env = "CLINFHIR_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a search and show the SQL it translates to
    Explain(ExplainArgs),
    /// Run a search against rows loaded from a JSON file
    Search(SearchArgs),
    /// List the search parameters of a resource type
    Params(ParamsArgs),
    /// Decode a continuation token
    Cursor(CursorArgs),
    /// Show the effective settings
    Settings,
}

#[derive(clap::Args)]
pub struct ExplainArgs {
    /// Resource type (e.g. Patient)
    pub resource_type: String,
    /// URL query string (e.g. "given=ann&_sort=-birthdate")
    #[arg(default_value = "")]
    pub query: String,
}

#[derive(clap::Args)]
pub struct SearchArgs {
    /// Resource type (e.g. Patient)
    pub resource_type: String,
    /// URL query string
    #[arg(default_value = "")]
    pub query: String,
    /// JSON file mapping table names to arrays of rows
    #[arg(short, long)]
    pub data: String,
}

#[derive(clap::Args)]
pub struct ParamsArgs {
    /// Resource type; lists every resource type when omitted
    pub resource_type: Option<String>,
}

#[derive(clap::Args)]
pub struct CursorArgs {
    /// Continuation token
    pub token: String,
}
