//! pgread — read-only PostgreSQL data sources from the command line
//!
//! # Usage
//!
//! ```bash
//! # Run a query
//! pgread query -d app "SELECT * FROM users WHERE id = \$1::int" --arg 42
//!
//! # Enumerate tables
//! pgread tables -d app --schema public --like-any 'user%'
//!
//! # Show the composed SQL only
//! pgread tables -d app --regex '^audit_' --dry-run
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use pgread::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgread")]
#[command(version)]
#[command(about = "Read-only PostgreSQL data sources", long_about = None)]
#[command(after_help = "EXAMPLES:
    pgread query -d app \"SELECT 1 as a, '2' as b;\"
    pgread tables -d app --schema public --type 'BASE TABLE'
    pgread sequences -d app --not-like-all '%tmp%' --format json")]
struct Cli {
    /// Database connection URL (overrides the config file)
    #[arg(long, global = true, env = "PGREAD_DATABASE_URL")]
    database_url: Option<String>,

    /// Path to a pgread.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print its columns and rows
    Query {
        /// Target database (defaults to the configured database)
        #[arg(short, long)]
        database: Option<String>,

        /// The statement to run
        query: String,

        /// Positional parameters ($1, $2, ...)
        #[arg(short, long = "arg")]
        args: Vec<String>,
    },
    /// Enumerate tables
    Tables {
        #[command(flatten)]
        filters: CatalogArgs,

        /// Table types (e.g. 'BASE TABLE', 'VIEW')
        #[arg(long = "type")]
        table_types: Vec<String>,

        /// Include pg_catalog and information_schema
        #[arg(long)]
        include_system_schemas: bool,
    },
    /// Enumerate sequences
    Sequences {
        #[command(flatten)]
        filters: CatalogArgs,
    },
}

#[derive(Args)]
struct CatalogArgs {
    /// Target database (defaults to the configured database)
    #[arg(short, long)]
    database: Option<String>,

    /// Restrict to schemas
    #[arg(long = "schema")]
    schemas: Vec<String>,

    /// Name matches any of these LIKE patterns
    #[arg(long = "like-any")]
    like_any: Vec<String>,

    /// Name matches all of these LIKE patterns
    #[arg(long = "like-all")]
    like_all: Vec<String>,

    /// Name matches none of these LIKE patterns
    #[arg(long = "not-like-all")]
    not_like_all: Vec<String>,

    /// Name matches this regular expression
    #[arg(long)]
    regex: Option<String>,

    /// Print the composed SQL without running it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pgread=debug" } else { "pgread=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.database_url {
        config.url = Some(url.clone());
    }
    let default_database = config.database.clone();
    let client = Client::new(config);

    let result = dispatch(cli, &client, default_database).await;
    client.close().await;
    result
}

async fn dispatch(cli: &Cli, client: &Client, default_database: String) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Query { database, query, args } => {
            let source = QueryDataSource {
                database: database.clone().unwrap_or(default_database),
                query: query.clone(),
                args: args.clone(),
            };
            if cli.verbose {
                eprintln!("{} {}", "Id:".dimmed(), source.id().yellow());
            }
            let output = source.read(client).await?;
            match cli.format {
                OutputFormat::Json => print_json(&output)?,
                OutputFormat::Table => print_query(&output),
            }
            Ok(())
        }
        Commands::Tables {
            filters,
            table_types,
            include_system_schemas,
        } => {
            let source = TablesDataSource {
                database: filters.database.clone().unwrap_or(default_database),
                schemas: filters.schemas.clone(),
                table_types: table_types.clone(),
                like_any_patterns: filters.like_any.clone(),
                like_all_patterns: filters.like_all.clone(),
                not_like_all_patterns: filters.not_like_all.clone(),
                regex_pattern: filters.regex.clone(),
                include_system_schemas: *include_system_schemas,
            };
            if filters.dry_run {
                print_sql(&source.sql());
                return Ok(());
            }
            let output = source.read(client).await?;
            match cli.format {
                OutputFormat::Json => print_json(&output)?,
                OutputFormat::Table => print_table(
                    &["schema_name", "table_name"],
                    output
                        .tables
                        .iter()
                        .map(|t| vec![t.schema_name.clone(), t.table_name.clone()])
                        .collect(),
                ),
            }
            Ok(())
        }
        Commands::Sequences { filters } => {
            let source = SequencesDataSource {
                database: filters.database.clone().unwrap_or(default_database),
                schemas: filters.schemas.clone(),
                like_any_patterns: filters.like_any.clone(),
                like_all_patterns: filters.like_all.clone(),
                not_like_all_patterns: filters.not_like_all.clone(),
                regex_pattern: filters.regex.clone(),
            };
            if filters.dry_run {
                print_sql(&source.sql());
                return Ok(());
            }
            let output = source.read(client).await?;
            match cli.format {
                OutputFormat::Json => print_json(&output)?,
                OutputFormat::Table => print_table(
                    &["schema_name", "sequence_name", "data_type"],
                    output
                        .sequences
                        .iter()
                        .map(|s| vec![s.schema_name.clone(), s.sequence_name.clone(), s.data_type.clone()])
                        .collect(),
                ),
            }
            Ok(())
        }
    }
}

fn print_sql(sql: &str) {
    println!("{}", "Generated SQL:".green().bold());
    println!("{}", sql.white());
}

fn print_json<T: Serialize>(output: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

fn print_query(output: &QueryOutput) {
    let headers: Vec<&str> = output.columns.iter().map(|c| c.name.as_str()).collect();
    let types: Vec<String> = output
        .columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.type_name.to_lowercase()))
        .collect();
    println!("{} {}", "Columns:".dimmed(), types.join(", ").cyan());
    println!();

    let rows = output
        .rows
        .iter()
        .map(|row| row.values().cloned().collect())
        .collect();
    print_table(&headers, rows);
}

fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let header: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:width$}", h, width = w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:width$}", cell, width = w))
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", rows.len().to_string().cyan());
}
