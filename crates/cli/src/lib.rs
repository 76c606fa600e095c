use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use codefacts_protocol::{serialize_json, ErrorEnvelope, ErrorKind, Response};
use codefacts_query::{Engine, EngineConfig, QueryError};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

pub mod config;

use config::FlagConfig;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "codefacts")]
#[command(about = "Query engine over statically extracted code facts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Knowledge store database file (overrides CODEFACTS_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Default fact dump directory (overrides CODEFACTS_FACTS_PATH)
    #[arg(long, global = true)]
    facts: Option<PathBuf>,

    /// Hard cap on returned rows (overrides CODEFACTS_MAX_RESULTS)
    #[arg(long, global = true)]
    max_results: Option<usize>,

    /// Hard cap on traversal depth (overrides CODEFACTS_MAX_DEPTH)
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a fact dump and replace the stored snapshot
    Ingest(IngestArgs),

    /// Execute a JSON request ({"operation": ..., "payload": {...}}) and print the JSON response
    Command(CommandArgs),

    /// Print counts for the stored snapshot
    Stats(StatsArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Fact dump directory (defaults to --facts / CODEFACTS_FACTS_PATH)
    path: Option<PathBuf>,

    /// Print the JSON response instead of a summary line
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CommandArgs {
    /// Inline JSON request (mutually exclusive with --file)
    #[arg(long, conflicts_with = "file")]
    json: Option<String>,

    /// Path to a file containing the JSON request
    #[arg(long)]
    file: Option<PathBuf>,

    /// Pretty-print JSON response
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct StatsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // `command` always writes JSON; keep the terminal free of info chatter.
    if matches!(cli.command, Commands::Command(_)) && !cli.verbose {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let flags = FlagConfig {
        db: cli.db.clone(),
        facts: cli.facts.clone(),
        max_results: cli.max_results,
        max_depth: cli.max_depth,
        config_file: cli.config.clone(),
    };

    match cli.command {
        Commands::Command(args) => run_command(args, &flags),
        Commands::Ingest(args) => run_ingest(args, &flags),
        Commands::Stats(args) => run_stats(args, &flags),
    }
}

fn open_engine(flags: &FlagConfig) -> Result<Engine> {
    let config: EngineConfig = config::resolve(flags, |key| std::env::var(key).ok())?;
    Engine::open(config).context("Failed to open the knowledge store")
}

fn error_response(kind: ErrorKind, message: impl Into<String>) -> Response {
    Response::error(ErrorEnvelope::new(kind, message))
}

fn emit(response: &Response, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serialize_json(response)?
    };
    print_stdout(&output)?;
    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

/// Every outcome, including bad input and an unreachable store, is printed as a
/// JSON response.
fn run_command(args: CommandArgs, flags: &FlagConfig) -> Result<()> {
    let raw = match read_request(&args) {
        Ok(raw) => raw,
        Err(err) => {
            return emit(
                &error_response(ErrorKind::InvalidQueryError, format!("{err:#}")),
                args.pretty,
            )
        }
    };
    let request: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            return emit(
                &error_response(
                    ErrorKind::InvalidQueryError,
                    format!("Invalid JSON passed to --json/--file: {err}"),
                ),
                args.pretty,
            )
        }
    };

    let config = match config::resolve(flags, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(err) => {
            return emit(
                &error_response(ErrorKind::InvalidQueryError, format!("{err:#}")),
                args.pretty,
            )
        }
    };
    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(err) => return emit(&failure_response(&err), args.pretty),
    };

    let response = engine.execute(&request);
    emit(&response, args.pretty)
}

fn failure_response(err: &QueryError) -> Response {
    let envelope = ErrorEnvelope::new(err.kind(), err.to_string());
    Response::error(match err.hint() {
        Some(hint) => envelope.with_hint(hint),
        None => envelope,
    })
}

fn read_request(args: &CommandArgs) -> Result<String> {
    if let Some(raw) = &args.json {
        return Ok(raw.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON from {}", path.display()));
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read JSON from stdin")?;

    if buffer.trim().is_empty() {
        anyhow::bail!("Command request is empty. Provide --json, --file, or pipe JSON via stdin.");
    }

    Ok(buffer)
}

fn run_ingest(args: IngestArgs, flags: &FlagConfig) -> Result<()> {
    let engine = open_engine(flags)?;
    let report = engine
        .ingest(args.path.as_deref())
        .context("Ingestion failed; the previous snapshot is unchanged")?;

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&report)?)?;
    } else {
        let s = &report.summary;
        println!(
            "Ingested {} modules, {} functions, {} types, {} call edges from {} (generation {}, {} warnings)",
            s.modules,
            s.functions,
            s.types,
            s.call_edges,
            report.source,
            s.generation,
            report.warnings.len()
        );
    }
    Ok(())
}

fn run_stats(args: StatsArgs, flags: &FlagConfig) -> Result<()> {
    let engine = open_engine(flags)?;
    let response = engine.execute(&serde_json::json!({"operation": "code_statistics"}));
    if let Some(error) = &response.error {
        anyhow::bail!("{}: {}", error.kind.as_str(), error.message);
    }

    if args.json {
        return print_stdout(&serde_json::to_string_pretty(&response.data)?);
    }

    let data = &response.data;
    let count = |key: &str| data.get(key).and_then(Value::as_u64).unwrap_or(0);
    println!("Snapshot generation: {}", count("generation"));
    println!("Modules:     {}", count("modules"));
    println!("Functions:   {}", count("functions"));
    println!("Types:       {}", count("types"));
    println!("Classes:     {}", count("classes"));
    println!("Instances:   {}", count("instances"));
    println!("Imports:     {}", count("imports"));
    println!(
        "Call edges:  {} ({} dangling)",
        count("call_edges"),
        count("dangling_call_edges")
    );
    println!(
        "Type edges:  {} ({} dangling)",
        count("type_edges"),
        count("dangling_type_edges")
    );
    if let Some(top) = data.get("top_modules").and_then(Value::as_array) {
        if !top.is_empty() {
            println!("Largest modules:");
            for entry in top {
                println!(
                    "  {:<40} {}",
                    entry.get("module").and_then(Value::as_str).unwrap_or("?"),
                    entry.get("functions").and_then(Value::as_u64).unwrap_or(0)
                );
            }
        }
    }
    Ok(())
}
