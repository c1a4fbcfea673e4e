//! Error types for migration operations

use crate::embedding::EmbeddingError;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code reported for configuration problems detected before any write.
pub const CONFIG_EXIT_CODE: u8 = 2;

/// Exit code reported for every other fatal failure.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// Configuration problems. All of them are detected before the first write.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Snapshot directory does not exist
    #[error("source directory not found: {0}")]
    MissingSource(PathBuf),

    /// Dimension given on the command line disagrees with the snapshot
    #[error("embedding dimension mismatch: file={file:?} arg={arg:?}")]
    DimensionMismatch {
        /// `embedding_dim` stored in the vector snapshot
        file: Option<usize>,
        /// Dimension requested by the operator
        arg: Option<usize>,
    },

    /// Vector migration needs a dimension and none was found
    #[error("embedding dimension is required for vector migration")]
    MissingDimension,

    /// Re-embedding needs both model name and dimension for a side
    #[error("{side}-model and {side}-dim are required")]
    MissingModel {
        /// `source` or `target`
        side: &'static str,
    },

    /// Source and target resolve to the same vector table
    #[error("source and target resolve to the same table: {0}")]
    SameTable(String),

    /// Batch size must be positive
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
}

/// Errors that can occur during migration or re-embedding
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Source file held no recoverable JSON object
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File being loaded
        path: PathBuf,
        /// Original decoder failure
        #[source]
        source: serde_json::Error,
    },

    /// Malformed graph exchange file
    #[error("failed to read graph {path}: {message}")]
    Graph {
        /// File being loaded
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },

    /// Could not establish the database session
    #[error("failed to connect to database: {0}")]
    Connection(String),

    /// Query or write failed after retries
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedding provider failure
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Table scan did not make progress
    #[error("pagination error: {0}")]
    Pagination(String),

    /// Checkpoint error
    #[error("checkpoint operation failed: {0}")]
    Checkpoint(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrationError {
    /// Process exit code for this failure
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => CONFIG_EXIT_CODE,
            _ => FAILURE_EXIT_CODE,
        }
    }
}

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;
