//! `batchwise` command-line entry point.
//!
//! Reads a batch request, runs it against a remote store, and prints the
//! report on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use batchwise_core::{BatchRequest, RemoteStore};
use batchwise_engine::{
    BatchEngine, EngineConfig, HttpStore, HttpStoreConfig, MemoryStore, SchemaValidator,
    StoreRegistry,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "batchwise", version, about = "Run batched create/update/delete operations against a remote object store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a batch request and print the report
    Run(RunArgs),
    /// Print the JSON schema of the request format
    Schema,
}

#[derive(Args)]
struct RunArgs {
    /// Request JSON. Read from --input or stdin when omitted.
    request: Option<String>,

    /// Read the request from a file
    #[arg(short, long, conflicts_with = "request")]
    input: Option<PathBuf>,

    /// Property schema file; enables schema validation
    #[arg(long, env = "BATCHWISE_SCHEMA")]
    schema: Option<PathBuf>,

    /// Base URL of the remote store API
    #[arg(long, env = "BATCHWISE_BASE_URL", required_unless_present = "dry_run")]
    base_url: Option<String>,

    /// Bearer token for the remote store API
    #[arg(long, env = "BATCHWISE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Run against an in-memory store instead of the remote API
    #[arg(long)]
    dry_run: bool,

    /// Timeout for each remote call, in milliseconds
    #[arg(long, env = "BATCHWISE_CALL_TIMEOUT_MS", default_value_t = 30_000)]
    call_timeout_ms: u64,

    /// Maximum remote calls in flight
    #[arg(long, env = "BATCHWISE_MAX_IN_FLIGHT", default_value_t = 16)]
    max_in_flight: usize,

    /// Maximum concurrently dispatched chunks per group
    #[arg(long, default_value_t = 4)]
    chunk_workers: usize,

    /// Concurrent requests the remote store accepts
    #[arg(long, env = "BATCHWISE_STORE_CONCURRENCY", default_value_t = 1)]
    store_concurrency: usize,

    /// Emit logs as JSON
    #[arg(long, env = "BATCHWISE_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_request(args: &RunArgs) -> anyhow::Result<String> {
    if let Some(request) = &args.request {
        return Ok(request.clone());
    }
    if let Some(path) = &args.input {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read request file {}", path.display()));
    }
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("failed to read request from stdin")?;
    Ok(text)
}

fn build_store(args: &RunArgs) -> anyhow::Result<Arc<dyn RemoteStore>> {
    if args.dry_run {
        info!("dry run: using in-memory store");
        return Ok(Arc::new(
            MemoryStore::new().with_concurrency(args.store_concurrency),
        ));
    }
    let base_url = args
        .base_url
        .clone()
        .context("--base-url is required unless --dry-run is set")?;
    let mut config = HttpStoreConfig::new(base_url);
    config.token.clone_from(&args.token);
    config.request_timeout_ms = args.call_timeout_ms;
    config.max_concurrent_requests = args.store_concurrency;
    Ok(Arc::new(HttpStore::new(config)?))
}

async fn run(args: RunArgs) -> anyhow::Result<String> {
    let request = BatchRequest::from_json(&read_request(&args).await?)?;
    let store = build_store(&args)?;

    let config = EngineConfig {
        call_timeout_ms: args.call_timeout_ms,
        max_in_flight_calls: args.max_in_flight,
        chunk_workers: args.chunk_workers,
        ..EngineConfig::default()
    };
    let mut engine = BatchEngine::new(Arc::new(StoreRegistry::with_default(store)), config);
    if let Some(path) = &args.schema {
        engine = engine.with_validator(Arc::new(SchemaValidator::from_file(path)?));
    }

    let report = engine.execute_request(request).await?;
    info!(
        total = report.summary.total_operations,
        successful = report.summary.successful_operations,
        failed = report.summary.failed_operations,
        validation_failed = report.summary.validation_failed,
        "batch complete"
    );
    Ok(report.to_json_pretty()?)
}

fn request_schema() -> serde_json::Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "BatchRequest",
        "type": "object",
        "required": ["operations"],
        "properties": {
            "operations": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["operationType", "objectType"],
                    "properties": {
                        "operationType": {"enum": ["create", "update", "delete"]},
                        "objectType": {"type": "string"},
                        "data": {
                            "type": "object",
                            "properties": {
                                "properties": {"type": "object"},
                                "id": {"type": ["string", "number"]}
                            }
                        },
                        "operationId": {"type": "string"}
                    }
                }
            },
            "autoValidate": {"type": "boolean", "default": true},
            "fallbackStrategy": {
                "enum": ["individual", "retry_batch", "skip_failed", "partial_batch"],
                "default": "individual"
            },
            "maxBatchSize": {"type": "integer", "minimum": 1, "default": 100},
            "retryFailed": {"type": "boolean", "default": true}
        }
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Schema => {
            println!("{:#}", request_schema());
            ExitCode::SUCCESS
        }
        Commands::Run(args) => {
            init_tracing(args.log_json);
            match run(args).await {
                Ok(report) => {
                    println!("{report}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!(error = %format!("{err:#}"), "batch run failed");
                    println!("{}", json!({ "error": format!("{err:#}") }));
                    ExitCode::FAILURE
                }
            }
        }
    }
}
