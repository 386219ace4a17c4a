//! Tabula CLI - compile and run query specifications
//!
//! Usage:
//!   tabula compile <spec.json> [--dialect <dialect>]
//!   tabula run <spec.json> [--config <tabula.toml>]
//!   tabula values <entity> <field> [--prefix <text>] [--limit <n>]
//!   tabula catalog
//!
//! Logging goes to stderr and is controlled by `TABULA_LOG` (e.g. `TABULA_LOG=debug`).

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabula::catalog::{CatalogSnapshot, StaticCatalog};
use tabula::compile::{compile, CompileOptions};
use tabula::config::Settings;
use tabula::engine::{Engine, DEFAULT_DISTINCT_LIMIT};
use tabula::spec::QuerySpec;
use tabula::sql::Dialect;
use tabula::validation::validate;
use tabula::EngineError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Tabula - compile query specifications to parameterized SQL and run them")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to TABULA_CONFIG, ./tabula.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL and parameters for a specification
    Compile {
        /// Path to the specification JSON
        file: PathBuf,

        /// SQL dialect to generate
        #[arg(short, long, default_value = "postgres")]
        dialect: DialectArg,
    },

    /// Execute a specification and print the result JSON
    Run {
        /// Path to the specification JSON
        file: PathBuf,
    },

    /// List the most frequent values of a field
    Values {
        entity: String,
        field: String,

        /// Only values starting with this text
        #[arg(short, long)]
        prefix: Option<String>,

        #[arg(short, long, default_value_t = DEFAULT_DISTINCT_LIMIT)]
        limit: u64,
    },

    /// Print the effective catalog and join registry
    Catalog,
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Duckdb,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("TABULA_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(code) => return code,
    };

    match cli.command {
        Commands::Compile { file, dialect } => cmd_compile(&settings, file, dialect).await,
        Commands::Run { file } => cmd_run(&settings, file).await,
        Commands::Values {
            entity,
            field,
            prefix,
            limit,
        } => cmd_values(&settings, &entity, &field, prefix.as_deref(), limit).await,
        Commands::Catalog => cmd_catalog(&settings).await,
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, ExitCode> {
    let loaded = match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    loaded.map_err(|e| {
        eprintln!("Error loading settings: {}", e);
        ExitCode::FAILURE
    })
}

fn read_spec(file: &Path) -> Result<QuerySpec, ExitCode> {
    let source = fs::read_to_string(file).map_err(|e| {
        eprintln!("Error reading file '{}': {}", file.display(), e);
        ExitCode::FAILURE
    })?;
    serde_json::from_str(&source).map_err(|e| {
        eprintln!("Invalid specification '{}': {}", file.display(), e);
        ExitCode::FAILURE
    })
}

fn report(err: &EngineError) -> ExitCode {
    eprintln!("Error [{}]: {}", err.reason_code(), err.public_message());
    if err.is_client_error() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn engine(settings: &Settings) -> Result<Engine, ExitCode> {
    Engine::from_settings(settings).await.map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::FAILURE
    })
}

async fn snapshot(settings: &Settings) -> Result<CatalogSnapshot, ExitCode> {
    let catalog: StaticCatalog = settings.catalog.to_catalog();
    CatalogSnapshot::load(&catalog, &catalog).await.map_err(|e| {
        eprintln!("Error loading catalog: {}", e);
        ExitCode::FAILURE
    })
}

/// Compile offline: only the configured catalog and mapping are needed.
async fn cmd_compile(settings: &Settings, file: PathBuf, dialect: DialectArg) -> ExitCode {
    let spec = match read_spec(&file) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let snapshot = match snapshot(settings).await {
        Ok(s) => s,
        Err(code) => return code,
    };
    let query = &settings.query;

    let validated = match validate(&spec, &snapshot, query.max_limit) {
        Ok(v) => v,
        Err(e) => return report(&EngineError::from(e)),
    };
    for warning in &validated.warnings {
        eprintln!("warning: {}", warning);
    }

    let options = CompileOptions::default()
        .with_dialect(dialect.into())
        .with_pivot_source_limit(query.pivot_source_limit);
    match compile(&validated, &settings.mapping.to_mapper(), &options) {
        Ok(compiled) => {
            println!("{}", compiled.sql);
            if !compiled.params.is_empty() {
                println!();
                for (i, param) in compiled.params.iter().enumerate() {
                    println!("-- param {}: {}", i + 1, param);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_run(settings: &Settings, file: PathBuf) -> ExitCode {
    let spec = match read_spec(&file) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let engine = match engine(settings).await {
        Ok(e) => e,
        Err(code) => return code,
    };

    match engine.execute(&spec).await {
        Ok(result) => print_json(&result),
        Err(e) => report(&e),
    }
}

async fn cmd_values(
    settings: &Settings,
    entity: &str,
    field: &str,
    prefix: Option<&str>,
    limit: u64,
) -> ExitCode {
    let engine = match engine(settings).await {
        Ok(e) => e,
        Err(code) => return code,
    };

    match engine.list_distinct_values(entity, field, prefix, limit).await {
        Ok(values) => print_json(&values),
        Err(e) => report(&e),
    }
}

async fn cmd_catalog(settings: &Settings) -> ExitCode {
    let snapshot = match snapshot(settings).await {
        Ok(s) => s,
        Err(code) => return code,
    };

    let entities: Vec<_> = snapshot
        .entities()
        .iter()
        .map(|e| {
            serde_json::json!({
                "id": e.id,
                "displayName": e.display_name,
                "visible": e.visible,
                "columns": snapshot.columns(&e.id),
            })
        })
        .collect();

    print_json(&serde_json::json!({
        "entities": entities,
        "joins": snapshot.join_keys(),
    }))
}
