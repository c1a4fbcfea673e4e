//! Re-embed PostgreSQL vector tables into a new embedding model
//!
//! Non-vector data is left untouched; the target model's tables (named with
//! the model suffix) are filled from the source model's tables.

use anyhow::{Context, Result, bail};
use clap::Parser;
use migration_common::error::FAILURE_EXIT_CODE;
use migration_common::reembed::run_reembed;
use migration_common::{
    EmbeddingArgs, EmbeddingProvider, MigrationError, ModelSpec, PostgresClient, PostgresConfig,
    ReembedConfig, resolve_workspace,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reembed-vectors")]
#[command(about = "Re-embed PostgreSQL vector tables into a new embedding model", long_about = None)]
struct Args {
    /// Target workspace (defaults to POSTGRES_WORKSPACE, then WORKSPACE)
    #[arg(long)]
    workspace: Option<String>,

    /// Source embedding model (table suffix) to read from
    #[arg(long, env = "SOURCE_EMBEDDING_MODEL")]
    source_model: Option<String>,

    /// Source embedding dimension
    #[arg(long, env = "SOURCE_EMBEDDING_DIM")]
    source_dim: Option<usize>,

    /// Target embedding model name
    #[arg(long, env = "EMBEDDING_MODEL")]
    target_model: Option<String>,

    /// Target embedding dimension
    #[arg(long, env = "EMBEDDING_DIM")]
    target_dim: Option<usize>,

    /// Rows per page and per upsert call
    #[arg(long, default_value = "500")]
    batch_size: usize,

    /// Skip chunks
    #[arg(long)]
    skip_chunks: bool,

    /// Skip entities
    #[arg(long)]
    skip_entities: bool,

    /// Skip relations
    #[arg(long)]
    skip_relations: bool,

    /// Directory for per-class checkpoints; enables resuming
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[command(flatten)]
    embedding: EmbeddingArgs,

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
    tracing::info!("Re-embedding finished in {:.2}s", start.elapsed().as_secs_f64());
    code
}

fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<MigrationError>()
        .map_or(FAILURE_EXIT_CODE, MigrationError::exit_code)
}

async fn run(args: Args) -> Result<()> {
    let source = ModelSpec::require("source", args.source_model, args.source_dim)
        .map_err(MigrationError::from)?;
    let target = ModelSpec::require("target", args.target_model, args.target_dim)
        .map_err(MigrationError::from)?;

    let config = ReembedConfig {
        workspace: resolve_workspace(args.workspace.as_deref()),
        embedding_batch_num: args.embedding.batch_num,
        batch_size: args.batch_size,
        skip_chunks: args.skip_chunks,
        skip_entities: args.skip_entities,
        skip_relations: args.skip_relations,
        checkpoint_dir: args.checkpoint_dir,
        source,
        target,
    };
    config.validate().map_err(MigrationError::from)?;

    let provider = EmbeddingProvider::from_config(&args.embedding.to_config(&config.target))
        .map_err(MigrationError::from)?;

    tracing::info!(
        workspace = %config.workspace,
        source_model = %config.source.model,
        source_dim = config.source.dim,
        target_model = %config.target.model,
        target_dim = config.target.dim,
        binding = ?args.embedding.binding,
        "Starting re-embedding"
    );

    let client = PostgresClient::connect(&args.postgres).await?;
    let report = run_reembed(&config, &client, &provider).await;
    client.close().await;
    let report = report.context("re-embedding setup failed")?;

    if !report.is_success() {
        let failed: Vec<&str> = report.failed.iter().map(|(class, _)| class.name()).collect();
        bail!("re-embedding failed for: {}", failed.join(", "));
    }
    Ok(())
}
