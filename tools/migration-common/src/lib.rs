//! Shared infrastructure for moving knowledge-store snapshots into PostgreSQL
//!
//! Two pipelines are built from these modules: replaying a file snapshot
//! (key-value JSON, compressed vector snapshots, GraphML) into relational and
//! vector tables, and re-embedding existing vector tables for a new
//! embedding model.

pub mod batch_writer;
pub mod checkpoint;
pub mod config;
pub mod embedding;
pub mod error;
pub mod graphml;
pub mod loader;
pub mod migrate;
pub mod namespace;
pub mod postgres;
pub mod progress;
pub mod reembed;
pub mod storage;
pub mod streaming;
pub mod vector_codec;

/// A JSON object with keys in document order
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

pub use batch_writer::BatchWriter;
pub use checkpoint::{Checkpoint, CheckpointManager};
pub use config::{
    EmbeddingArgs, MigrationConfig, ModelSpec, PostgresConfig, ReembedConfig, RetryPolicy,
    resolve_workspace,
};
pub use embedding::{EmbeddingBinding, EmbeddingConfig, EmbeddingError, EmbeddingProvider};
pub use error::{ConfigError, MigrationError, MigrationResult};
pub use graphml::{GraphDocument, GraphEdge, GraphNode};
pub use loader::{load_json_document, load_optional_json_document};
pub use migrate::PreparedMigration;
pub use namespace::{KvNamespace, VectorClass};
pub use postgres::PostgresClient;
pub use progress::{MigrationStats, ProgressTracker};
pub use reembed::{ReembedClass, ReembedReport};
pub use storage::{BatchExecutor, GraphStorage, KvStorage, RowSource, SqlValue, VectorSink};
pub use streaming::TableScan;
pub use vector_codec::{SkipReason, decode_vector, encode_vector};
