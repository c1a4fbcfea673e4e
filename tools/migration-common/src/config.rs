//! Command-line and environment configuration shared by the migration tools

use crate::embedding::{EmbeddingBinding, EmbeddingConfig};
use crate::error::ConfigError;
use crate::namespace::VectorClass;
use crate::postgres::vector_table_name;
use std::path::PathBuf;
use std::time::Duration;

/// Workspace used when nothing else is configured
pub const DEFAULT_WORKSPACE: &str = "default";

/// PostgreSQL connection settings
#[derive(Debug, Clone, clap::Args)]
pub struct PostgresConfig {
    /// Database host
    #[arg(long = "pg-host", env = "POSTGRES_HOST", default_value = "localhost")]
    pub host: String,

    /// Database port
    #[arg(long = "pg-port", env = "POSTGRES_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Database user
    #[arg(long = "pg-user", env = "POSTGRES_USER", default_value = "postgres")]
    pub user: String,

    /// Database password
    #[arg(long = "pg-password", env = "POSTGRES_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name
    #[arg(long = "pg-database", env = "POSTGRES_DATABASE", default_value = "postgres")]
    pub database: String,

    /// Pool size; the pipelines use one connection at a time
    #[arg(long = "pg-max-connections", env = "POSTGRES_MAX_CONNECTIONS", default_value_t = 2)]
    pub max_connections: u32,

    /// Attempts per statement batch before giving up
    #[arg(long = "pg-retries", env = "POSTGRES_CONNECTION_RETRIES", default_value_t = 3)]
    pub retries: u32,

    /// Initial retry backoff in seconds
    #[arg(long = "pg-retry-backoff", env = "POSTGRES_CONNECTION_RETRY_BACKOFF", default_value_t = 0.5)]
    pub retry_backoff: f64,

    /// Upper bound on retry backoff in seconds
    #[arg(long = "pg-retry-backoff-max", env = "POSTGRES_CONNECTION_RETRY_BACKOFF_MAX", default_value_t = 5.0)]
    pub retry_backoff_max: f64,
}

impl PostgresConfig {
    /// Retry policy derived from the backoff settings
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retries.max(1),
            initial: seconds(self.retry_backoff),
            max: seconds(self.retry_backoff_max),
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Exponential backoff with a bounded number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay after the first failure
    pub initial: Duration,
    /// Delay cap
    pub max: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (zero based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial: Duration::from_millis(500),
            max: Duration::from_secs(5),
        }
    }
}

/// Embedding backend settings
#[derive(Debug, Clone, clap::Args)]
pub struct EmbeddingArgs {
    /// Embedding backend
    #[arg(long = "embedding-binding", env = "EMBEDDING_BINDING", value_enum, default_value = "openai")]
    pub binding: EmbeddingBinding,

    /// Base URL of the embedding API
    #[arg(long = "embedding-host", env = "EMBEDDING_BINDING_HOST")]
    pub host: Option<String>,

    /// API key for the embedding backend
    #[arg(long = "embedding-api-key", env = "EMBEDDING_BINDING_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Send the target dimension with every request
    #[arg(long = "embedding-send-dim", env = "EMBEDDING_SEND_DIM")]
    pub send_dim: bool,

    /// Texts per embedding request
    #[arg(long = "embedding-batch-num", env = "EMBEDDING_BATCH_NUM", default_value_t = 16)]
    pub batch_num: usize,

    /// Embedding request timeout in seconds
    #[arg(long = "embedding-timeout", env = "EMBEDDING_TIMEOUT", default_value_t = 60)]
    pub timeout_secs: u64,
}

impl EmbeddingArgs {
    /// Provider settings for `target`
    #[must_use]
    pub fn to_config(&self, target: &ModelSpec) -> EmbeddingConfig {
        EmbeddingConfig {
            binding: self.binding,
            model: target.model.clone(),
            dim: target.dim,
            host: self.host.clone().filter(|h| !h.is_empty()),
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            send_dimensions: self.send_dim || self.binding == EmbeddingBinding::Gemini,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Workspace from an explicit value, then `POSTGRES_WORKSPACE`, then `WORKSPACE`
#[must_use]
pub fn resolve_workspace(explicit: Option<&str>) -> String {
    let postgres = std::env::var("POSTGRES_WORKSPACE").ok();
    let generic = std::env::var("WORKSPACE").ok();
    pick_workspace(explicit, postgres.as_deref(), generic.as_deref())
}

fn pick_workspace(explicit: Option<&str>, postgres: Option<&str>, generic: Option<&str>) -> String {
    [explicit, postgres, generic]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|w| !w.is_empty())
        .unwrap_or(DEFAULT_WORKSPACE)
        .to_string()
}

/// Embedding model name and dimension bound to a set of vector tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Model name, used as table suffix
    pub model: String,
    /// Vector dimension
    pub dim: usize,
}

impl ModelSpec {
    /// Both parts are mandatory; `side` names the flags in the error
    pub fn require(
        side: &'static str,
        model: Option<String>,
        dim: Option<usize>,
    ) -> Result<Self, ConfigError> {
        match (model.filter(|m| !m.trim().is_empty()), dim.filter(|&d| d > 0)) {
            (Some(model), Some(dim)) => Ok(Self { model, dim }),
            _ => Err(ConfigError::MissingModel { side }),
        }
    }
}

/// Snapshot migration settings
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory holding `kv_store_*.json`, `vdb_*.json` and the graph file
    pub source_dir: PathBuf,
    /// Target workspace
    pub workspace: String,
    /// Model name used as vector table suffix
    pub embedding_model: Option<String>,
    /// Dimension requested by the operator; must agree with the snapshot
    pub embedding_dim: Option<usize>,
    /// Rows per write
    pub batch_size: usize,
    /// Skip the KV namespaces
    pub skip_kv: bool,
    /// Skip document status
    pub skip_doc_status: bool,
    /// Skip the three vector tables
    pub skip_vectors: bool,
    /// Skip the graph
    pub skip_graph: bool,
}

impl MigrationConfig {
    /// Checks that need no file contents
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_dir.is_dir() {
            return Err(ConfigError::MissingSource(self.source_dir.clone()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        Ok(())
    }
}

/// Re-embedding settings
#[derive(Debug, Clone)]
pub struct ReembedConfig {
    /// Workspace to scan
    pub workspace: String,
    /// Model the existing tables were built with
    pub source: ModelSpec,
    /// Model to embed with
    pub target: ModelSpec,
    /// Rows per page and per target upsert
    pub batch_size: usize,
    /// Texts per embedding request
    pub embedding_batch_num: usize,
    /// Skip chunk vectors
    pub skip_chunks: bool,
    /// Skip entity vectors
    pub skip_entities: bool,
    /// Skip relation vectors
    pub skip_relations: bool,
    /// Where to keep per-class scan checkpoints
    pub checkpoint_dir: Option<PathBuf>,
}

impl ReembedConfig {
    /// Reject settings that would read and write the same table
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.embedding_batch_num == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        let source = vector_table_name(
            VectorClass::Chunks.base_table(),
            Some(&self.source.model),
            self.source.dim,
        );
        let target = vector_table_name(
            VectorClass::Chunks.base_table(),
            Some(&self.target.model),
            self.target.dim,
        );
        if source == target {
            return Err(ConfigError::SameTable(source));
        }
        Ok(())
    }
}
