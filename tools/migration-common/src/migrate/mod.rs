//! File snapshot to PostgreSQL migration
//!
//! [`prepare`] does everything that can fail as configuration (source
//! directory, vector snapshots, dimension agreement) before a connection is
//! opened. [`execute`] then replays KV namespaces, document status, vectors
//! and the graph, in that order.

mod graph;
mod kv;
mod vectors;

pub use graph::migrate_graph;
pub use kv::{migrate_doc_status, migrate_kv, partition_map};
pub use vectors::{migrate_vectors, relationship_fallback_content};

use crate::JsonMap;
use crate::config::{MigrationConfig, PostgresConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{ConfigError, MigrationResult};
use crate::graphml::GraphDocument;
use crate::loader::{load_json_document, load_optional_json_document};
use crate::namespace::{DOC_STATUS_FILE, GRAPH_FILE, KvNamespace, VectorClass};
use crate::postgres::{
    PgDocStatusStorage, PgGraphStorage, PgKvStorage, PgVectorStorage, PostgresClient, VectorTable,
};
use crate::progress::MigrationStats;
use crate::storage::BatchExecutor;
use serde_json::Value;

/// Dimension used for table definitions when vectors are skipped and none was given
const PLACEHOLDER_DIM: usize = 1;

/// A validated migration with its vector snapshots loaded
#[derive(Debug)]
pub struct PreparedMigration {
    config: MigrationConfig,
    embedding_dim: usize,
    vectors: Option<Vec<(VectorClass, JsonMap)>>,
}

impl PreparedMigration {
    /// Settings the migration runs with
    #[must_use]
    pub const fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Vector dimension for every vector table
    #[must_use]
    pub const fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

fn snapshot_dim(snapshot: &JsonMap) -> Option<usize> {
    snapshot
        .get("embedding_dim")
        .and_then(Value::as_u64)
        .and_then(|d| usize::try_from(d).ok())
}

/// Dimension requested on the command line must agree with the snapshot
pub fn resolve_dimension(arg: Option<usize>, file: Option<usize>) -> Result<usize, ConfigError> {
    match (arg, file) {
        (None, Some(file)) => Ok(file),
        (Some(arg), Some(file)) if arg == file => Ok(arg),
        (None, None) => Err(ConfigError::MissingDimension),
        (arg, file) => Err(ConfigError::DimensionMismatch { file, arg }),
    }
}

/// Validate `config` and load the vector snapshots.
///
/// The dimension comes from `vdb_chunks.json` and must match
/// `--embedding-dim` when given. The entity and relationship snapshots must
/// declare the same dimension; any disagreement is a configuration error
/// rather than a per-record skip.
pub fn prepare(config: MigrationConfig) -> MigrationResult<PreparedMigration> {
    config.validate()?;

    if config.embedding_model.as_deref().is_none_or(str::is_empty) {
        tracing::warn!("Embedding model name is missing; vector tables will not use model suffix");
    }

    if config.skip_vectors {
        let embedding_dim = config.embedding_dim.unwrap_or_else(|| {
            tracing::warn!(
                dim = PLACEHOLDER_DIM,
                "Embedding dim not provided; using placeholder for non-vector migration"
            );
            PLACEHOLDER_DIM
        });
        return Ok(PreparedMigration {
            config,
            embedding_dim,
            vectors: None,
        });
    }

    let mut snapshots = Vec::with_capacity(VectorClass::ALL.len());
    for class in VectorClass::ALL {
        let snapshot = load_json_document(&config.source_dir.join(class.file_name()))?;
        snapshots.push((class, snapshot));
    }

    let file_dim = snapshots.first().and_then(|(_, s)| snapshot_dim(s));
    let embedding_dim = resolve_dimension(config.embedding_dim, file_dim)?;
    for (class, snapshot) in &snapshots {
        if let Some(dim) = snapshot_dim(snapshot).filter(|&d| d != embedding_dim) {
            tracing::error!(file = class.file_name(), dim, expected = embedding_dim, "Snapshot dimension disagrees");
            return Err(ConfigError::DimensionMismatch {
                file: Some(dim),
                arg: Some(embedding_dim),
            }
            .into());
        }
    }

    tracing::info!(
        source = ?config.source_dir,
        workspace = %config.workspace,
        dim = embedding_dim,
        "Migration prepared"
    );
    Ok(PreparedMigration {
        config,
        embedding_dim,
        vectors: Some(snapshots),
    })
}

/// Replay the snapshot through `executor`, returning the stats of every pipeline run
pub async fn execute(
    prepared: &PreparedMigration,
    executor: &dyn BatchExecutor,
) -> MigrationResult<Vec<MigrationStats>> {
    let config = &prepared.config;
    let dir = &config.source_dir;
    let workspace = config.workspace.as_str();
    let mut all = Vec::new();

    let text_chunks = if config.skip_kv && config.skip_vectors {
        JsonMap::new()
    } else {
        load_optional_json_document(&dir.join(KvNamespace::TextChunks.file_name()))?
    };

    if !config.skip_kv {
        for namespace in KvNamespace::ALL {
            let loaded;
            let data = if namespace == KvNamespace::TextChunks {
                &text_chunks
            } else {
                loaded = load_optional_json_document(&dir.join(namespace.file_name()))?;
                &loaded
            };
            let storage = PgKvStorage::new(executor, namespace.table(), workspace);
            storage.initialize().await?;
            all.push(migrate_kv(&storage, namespace.stats_name(), data, config.batch_size).await?);
        }
    }

    if !config.skip_doc_status {
        let storage = PgDocStatusStorage::new(executor, workspace);
        storage.initialize().await?;
        let data = load_optional_json_document(&dir.join(DOC_STATUS_FILE))?;
        all.push(migrate_doc_status(&storage, &data).await?);
    }

    if let Some(snapshots) = &prepared.vectors {
        let provider = EmbeddingProvider::disabled(prepared.embedding_dim);
        for (class, snapshot) in snapshots {
            let table = VectorTable::new(
                *class,
                config.embedding_model.as_deref(),
                prepared.embedding_dim,
            );
            let storage = PgVectorStorage::new(executor, table, &provider, workspace, 1);
            storage.initialize().await?;
            all.push(
                migrate_vectors(
                    storage.table(),
                    executor,
                    workspace,
                    snapshot,
                    &text_chunks,
                    config.batch_size,
                )
                .await?,
            );
        }
    }

    if !config.skip_graph {
        let path = dir.join(GRAPH_FILE);
        if path.exists() {
            let graph = GraphDocument::from_path(&path)?;
            let storage = PgGraphStorage::new(executor, workspace);
            storage.initialize().await?;
            let (nodes, edges) = migrate_graph(&storage, &graph).await?;
            all.push(nodes);
            all.push(edges);
        } else {
            tracing::warn!(path = ?path, "Graph file not found; skipping graph migration");
        }
    }

    Ok(all)
}

/// Prepare, connect, execute and always release the connection
pub async fn run(
    config: MigrationConfig,
    postgres: &PostgresConfig,
) -> MigrationResult<Vec<MigrationStats>> {
    let prepared = prepare(config)?;
    let client = PostgresClient::connect(postgres).await?;
    let result = execute(&prepared, &client).await;
    client.close().await;
    result
}
