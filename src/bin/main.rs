//! SqlPilot CLI - inspect and query a database through the execution layer
//!
//! Usage:
//!   sqlpilot [--config <file>] [--database <path>] <command>
//!
//! Examples:
//!   sqlpilot --database shop.db query "SELECT * FROM orders" --format table-text
//!   sqlpilot --database shop.db describe orders
//!   sqlpilot --database shop.db joins orders users
//!   sqlpilot --database shop.db hints "SELECT * FROM orders LIMIT 10"

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlpilot::config::Settings;
use sqlpilot::execution::SqlOptions;
use sqlpilot::format::{FormatType, FormattedOutput};
use sqlpilot::relationships::DEFAULT_MAX_DEPTH;
use sqlpilot::{ExecError, SqlPilot, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlpilot")]
#[command(about = "SqlPilot - schema-aware SQL execution, join suggestions and query hints")]
#[command(version)]
struct Cli {
    /// Path to a sqlpilot.toml (defaults to the standard search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding database.name
    #[arg(short, long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a query and print the result
    Query {
        sql: String,

        /// Positional parameters bound to ?1, ?2, ...
        #[arg(short, long = "param")]
        params: Vec<String>,

        #[arg(short, long, default_value = "table-text")]
        format: FormatArg,

        /// Row cap (defaults to services.execution.max_rows)
        #[arg(long)]
        max_rows: Option<usize>,

        /// Include per-column summary statistics
        #[arg(long)]
        summary: bool,
    },

    /// Show table metadata
    Describe { table: String },

    /// Show statistics for one column
    Stats {
        table: String,
        column: String,

        #[arg(long)]
        refresh: bool,
    },

    /// Suggest join conditions between two tables
    Joins {
        left: String,
        right: String,

        /// Also print the foreign-key path between the tables
        #[arg(long)]
        path: bool,
    },

    /// Print advisory hints for a query
    Hints { sql: String },

    /// Print the foreign-key graph
    Graph {
        /// Start table (defaults to every table)
        #[arg(short, long)]
        start: Option<String>,

        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        depth: usize,
    },

    /// Re-introspect every table
    Refresh,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
    TableText,
    RowSet,
}

impl From<FormatArg> for FormatType {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => FormatType::Json,
            FormatArg::Csv => FormatType::Csv,
            FormatArg::TableText => FormatType::TableText,
            FormatArg::RowSet => FormatType::RowSet,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let pilot = SqlPilot::start(settings).await;
    let code = run(&pilot, cli.command).await;
    pilot.shutdown().await;
    code
}

fn load_settings(cli: &Cli) -> Result<Settings, sqlpilot::config::SettingsError> {
    let mut settings = match &cli.config {
        Some(path) => {
            let mut settings = Settings::from_file(path)?;
            settings.apply_env_overrides()?;
            settings
        }
        None => Settings::load()?,
    };
    if let Some(database) = &cli.database {
        settings.database.name = database.clone();
    }
    settings.validate()?;
    Ok(settings)
}

async fn run(pilot: &SqlPilot, command: Commands) -> ExitCode {
    match command {
        Commands::Query {
            sql,
            params,
            format,
            max_rows,
            summary,
        } => {
            let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
            let options = SqlOptions {
                max_rows,
                format: format.into(),
                include_summary: summary,
                ..SqlOptions::default()
            };
            let result = pilot.execute_sql(&sql, &params, &options).await;
            match (&result.data, result.success) {
                (Some(FormattedOutput::Text(text)), true) if !summary => {
                    println!("{}", text);
                    if result.truncated {
                        eprintln!("(truncated at {} rows)", result.row_count);
                    }
                    ExitCode::SUCCESS
                }
                _ => print_json(&result, result.success),
            }
        }
        Commands::Describe { table } => report(pilot.get_table_metadata(&table).await),
        Commands::Stats {
            table,
            column,
            refresh,
        } => report(pilot.get_column_statistics(&table, &column, refresh).await),
        Commands::Joins { left, right, path } => {
            let suggestions = match pilot.suggest_joins(&left, &right).await {
                Ok(s) => s,
                Err(e) => return fail(&e),
            };
            if !path {
                return print_json(&suggestions, true);
            }
            match pilot.join_path(&left, &right).await {
                Ok(path) => print_json(
                    &serde_json::json!({ "suggestions": suggestions, "path": path }),
                    true,
                ),
                Err(e) => fail(&e),
            }
        }
        Commands::Hints { sql } => print_json(&pilot.hints(&sql).await, true),
        Commands::Graph { start, depth } => {
            let graph = pilot.discover_relationships(start.as_deref(), depth).await;
            let ok = graph.is_ok();
            print_json(&graph, ok)
        }
        Commands::Refresh => report(pilot.refresh_schema().await),
    }
}

fn parse_param(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::from(raw)
    }
}

fn report<T: Serialize>(result: Result<T, ExecError>) -> ExitCode {
    match result {
        Ok(value) => print_json(&value, true),
        Err(e) => fail(&e),
    }
}

fn fail(err: &ExecError) -> ExitCode {
    print_json(&err.to_info(), false)
}

fn print_json<T: Serialize>(value: &T, ok: bool) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
