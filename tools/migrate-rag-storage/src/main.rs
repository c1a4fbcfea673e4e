//! File snapshot to PostgreSQL migration tool
//!
//! Existing vectors are copied as they are; nothing is re-embedded.

use anyhow::{Context, Result};
use clap::Parser;
use migration_common::error::FAILURE_EXIT_CODE;
use migration_common::{MigrationConfig, MigrationError, PostgresConfig, migrate, resolve_workspace};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "migrate-rag-storage")]
#[command(about = "Migrate rag_storage JSON, GraphML and vector snapshots into PostgreSQL", long_about = None)]
struct Args {
    /// Directory containing kv_store_*.json, vdb_*.json and the graph file
    #[arg(long, default_value = "data/rag_storage/v2")]
    source_dir: PathBuf,

    /// Target workspace (defaults to POSTGRES_WORKSPACE, then WORKSPACE)
    #[arg(long)]
    workspace: Option<String>,

    /// Embedding model name used as vector table suffix
    #[arg(long, env = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Embedding dimension; must match the vector snapshots
    #[arg(long)]
    embedding_dim: Option<usize>,

    /// Dimension for table definitions when vectors are skipped
    #[arg(long, env = "EMBEDDING_DIM", hide = true)]
    default_embedding_dim: Option<usize>,

    /// Rows per write
    #[arg(long, default_value = "500")]
    batch_size: usize,

    /// Skip KV storages
    #[arg(long)]
    skip_kv: bool,

    /// Skip doc_status storage
    #[arg(long)]
    skip_doc_status: bool,

    /// Skip vectors
    #[arg(long)]
    skip_vectors: bool,

    /// Skip graph
    #[arg(long)]
    skip_graph: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[command(flatten)]
    postgres: PostgresConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(args.log_level.into()))
        .init();

    let start = Instant::now();
    let code = match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    };
    tracing::info!("Migration finished in {:.2}s", start.elapsed().as_secs_f64());
    code
}

fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<MigrationError>()
        .map_or(FAILURE_EXIT_CODE, MigrationError::exit_code)
}

async fn run(args: Args) -> Result<()> {
    let embedding_dim = if args.skip_vectors {
        args.embedding_dim.or(args.default_embedding_dim)
    } else {
        args.embedding_dim
    };
    let config = MigrationConfig {
        workspace: resolve_workspace(args.workspace.as_deref()),
        source_dir: args.source_dir,
        embedding_model: args.embedding_model,
        embedding_dim,
        batch_size: args.batch_size,
        skip_kv: args.skip_kv,
        skip_doc_status: args.skip_doc_status,
        skip_vectors: args.skip_vectors,
        skip_graph: args.skip_graph,
    };

    tracing::info!(
        source = ?config.source_dir,
        workspace = %config.workspace,
        batch_size = config.batch_size,
        "Starting snapshot migration"
    );

    let stats = migrate::run(config, &args.postgres)
        .await
        .context("snapshot migration failed")?;

    let incomplete: Vec<&str> = stats
        .iter()
        .filter(|s| !s.is_complete())
        .map(|s| s.name.as_str())
        .collect();
    if !incomplete.is_empty() {
        tracing::warn!(pipelines = ?incomplete, "Some pipelines did not account for every record");
    }
    Ok(())
}
