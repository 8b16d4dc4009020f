use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tracing::Level;

use mssql_adapter::dialect;
use mssql_adapter::prelude::*;

const WORKER: &str = "cli";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "SQL Server connection diagnostics")]
struct Args {
    /// JSON connection profile.
    #[arg(long, global = true, default_value = "profile.json")]
    profile: PathBuf,
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the connection keys and test the connection.
    Debug,
    /// Run one statement and commit it.
    Query {
        sql: String,
        /// Print the returned rows.
        #[arg(long)]
        fetch: bool,
        /// Shorten the statement in logs.
        #[arg(long)]
        abridge: bool,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Print the SQL fragments used when generating statements.
    Dialect,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AdapterError> {
    if let Command::Dialect = args.command {
        println!("date function: {}", dialect::date_function());
        println!("text type:     {}", dialect::text_type());
        return Ok(());
    }

    let credentials = CredentialRecord::from_path(&args.profile)?;
    let manager = ConnectionManager::mssql(credentials);
    let outcome = match args.command {
        Command::Debug => debug_connection(&manager).await,
        Command::Query {
            sql,
            fetch,
            abridge,
            format,
        } => run_statement(&manager, sql, fetch, abridge, format).await,
        Command::Dialect => Ok(()),
    };
    manager.cleanup_all().await;
    outcome
}

async fn debug_connection(manager: &ConnectionManager) -> Result<(), AdapterError> {
    println!("Connection:");
    for (key, value) in manager.credentials().connection_keys() {
        println!("  {key}: {value}");
    }
    let request = QueryRequest::new("SELECT 1 AS ok").auto_begin(false);
    manager.run_query(WORKER, request).await?;
    println!("  Connection test: OK connection ok");
    Ok(())
}

async fn run_statement(
    manager: &ConnectionManager,
    sql: String,
    fetch: bool,
    abridge: bool,
    format: OutputFormat,
) -> Result<(), AdapterError> {
    let request = QueryRequest::new(sql).fetch(fetch).abridge(abridge);
    let (info, result) = manager.run_query(WORKER, request).await?;
    if info.transaction_open {
        manager.commit(WORKER).await?;
    }

    if fetch {
        match format {
            OutputFormat::Table => print_table(&result),
            OutputFormat::Json => print_json(&result),
        }
    }
    println!("{}", result.status());
    Ok(())
}

fn cell_text(value: &RowValues) -> String {
    match value.to_json() {
        Value::Null => "NULL".to_string(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn print_table(result: &QueryResult) {
    let header: Vec<&str> = result.columns().iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join("\t"));
    for row in &result.rows().results {
        let cells: Vec<String> = row.rows.iter().map(cell_text).collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_json(result: &QueryResult) {
    let rows: Vec<Value> = result
        .rows()
        .results
        .iter()
        .map(|row| {
            let object: Map<String, Value> = row
                .column_names
                .iter()
                .zip(&row.rows)
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            Value::Object(object)
        })
        .collect();
    let body = serde_json::json!({
        "columns": result.columns(),
        "rows": rows,
    });
    match serde_json::to_string_pretty(&body) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to render rows: {err}"),
    }
}
