//! tiermap CLI
//!
//! Administrative and inspection commands over a file-backed durable store.
//!
//! ```text
//! tiermap create-table                  provision the table (idempotent)
//! tiermap set orders a 123              write through both tiers
//! tiermap get orders a                  read (cache, then durable)
//! tiermap incr orders hits 5            atomic numeric add
//! tiermap delete orders a
//! tiermap keys orders                   full partition scan
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiermap::adapters::{FileDurableStore, InMemoryCacheBackend, LoggingUpdateListener};
use tiermap::domain::ports::TableSpec;
use tiermap::{
    provision_table, MapConfig, MapContext, ModePolicy, ProvisionOutcome, RunMode, Value,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiermap - cache-aside key/value maps
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the table files
    #[arg(long, env = "TIERMAP_DATA_DIR", default_value = "./tiermap-data")]
    data_dir: PathBuf,

    /// Durable table name
    #[arg(long, env = "TIERMAP_TABLE", default_value = tiermap::config::DEFAULT_TABLE_NAME)]
    table: String,

    /// Run mode (production, debug, test); test mode isolates keys in the
    /// test namespace
    #[arg(long, env = "TIERMAP_RUN_MODE", default_value = "production")]
    run_mode: RunMode,

    /// Cache entry timeout in seconds (0 = no expiry)
    #[arg(long, env = "TIERMAP_CACHE_TIMEOUT_SECS")]
    cache_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision the durable table (no-op with a warning if it exists)
    CreateTable {
        #[arg(long, default_value = "10")]
        read_units: u64,

        #[arg(long, default_value = "10")]
        write_units: u64,
    },

    /// Write a value (parsed as integer, then float, else string)
    Set { map: String, key: String, value: String },

    /// Read a value
    Get { map: String, key: String },

    /// Delete a key
    Delete { map: String, key: String },

    /// Atomically add to a numeric value
    Incr {
        map: String,
        key: String,
        #[arg(default_value = "1", allow_hyphen_values = true)]
        delta: String,
    },

    /// List every stored key of a map (full partition scan)
    Keys { map: String },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    debug!(
        data_dir = %args.data_dir.display(),
        table = %args.table,
        run_mode = ?args.run_mode,
        "Starting tiermap"
    );

    let store = Arc::new(FileDurableStore::new(&args.data_dir, &args.table));

    if let Command::CreateTable {
        read_units,
        write_units,
    } = args.command
    {
        let spec = TableSpec::new(&args.table).with_throughput(read_units, write_units);
        let outcome = provision_table(store.as_ref(), &spec)
            .await
            .with_context(|| format!("failed to provision table {}", args.table))?;
        match outcome {
            ProvisionOutcome::Created => println!("created table {}", args.table),
            ProvisionOutcome::AlreadyExists => println!("table {} already exists", args.table),
        }
        return Ok(());
    }

    let config = MapConfig::for_mode(args.run_mode, ModePolicy::default())
        .with_table_name(&args.table)
        .with_cache_timeout(args.cache_timeout_secs.map(Duration::from_secs));
    if config.cache_only {
        warn!(run_mode = ?args.run_mode, "Cache-only maps: values do not outlive this command");
    }
    let ctx = MapContext::new(Arc::new(InMemoryCacheBackend::new()), store, config)?;
    ctx.subscribe(Arc::new(LoggingUpdateListener::debug_level()));

    run(&ctx, args.command).await?;

    info!(metrics = ?ctx.metrics().snapshot(), "Done");
    Ok(())
}

async fn run(ctx: &MapContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::CreateTable { .. } => {}
        Command::Set { map, key, value } => {
            ctx.map(&map)?
                .set(&key, Value::parse_loose(&value))
                .await
                .with_context(|| format!("failed to set {}:{}", map, key))?;
        }
        Command::Get { map, key } => {
            let value = ctx
                .map(&map)?
                .get(&key)
                .await
                .with_context(|| format!("failed to get {}:{}", map, key))?;
            println!("{}", value);
        }
        Command::Delete { map, key } => {
            ctx.map(&map)?
                .delete(&key)
                .await
                .with_context(|| format!("failed to delete {}:{}", map, key))?;
        }
        Command::Incr { map, key, delta } => {
            ctx.map(&map)?
                .increment(&key, Value::parse_loose(&delta))
                .await
                .with_context(|| format!("failed to increment {}:{}", map, key))?;
        }
        Command::Keys { map } => {
            let mut keys: Vec<String> = ctx
                .map(&map)?
                .scan_keys()
                .await?
                .try_collect()
                .await
                .with_context(|| format!("failed to scan {}", map))?;
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
