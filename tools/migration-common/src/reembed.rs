//! Re-embedding of existing vector tables into a new model's tables
//!
//! Rows are read page by page from the source table and handed to the target
//! [`VectorSink`], which embeds their content before writing. Non-vector
//! columns are carried over unchanged.

use crate::JsonMap;
use crate::checkpoint::CheckpointManager;
use crate::config::ReembedConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MigrationError, MigrationResult};
use crate::namespace::{FIELD_SEP, VectorClass};
use crate::postgres::{PgVectorStorage, PostgresClient, VectorTable};
use crate::progress::{MigrationStats, ProgressTracker};
use crate::storage::{Column, RowSource, VectorSink};
use crate::streaming::TableScan;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

const CHUNK_COLUMNS: &[Column] = &[
    Column::text("id"),
    Column::text("full_doc_id"),
    Column::int("chunk_order_index"),
    Column::int("tokens"),
    Column::text("content"),
    Column::text("file_path"),
];

const ENTITY_COLUMNS: &[Column] = &[
    Column::text("id"),
    Column::text("entity_name"),
    Column::text("content"),
    Column::text_array("chunk_ids"),
    Column::text("file_path"),
];

const RELATION_COLUMNS: &[Column] = &[
    Column::text("id"),
    Column::text("source_id"),
    Column::text("target_id"),
    Column::text("content"),
    Column::text_array("chunk_ids"),
    Column::text("file_path"),
];

/// Record classes that can be re-embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReembedClass {
    /// Chunk vectors
    Chunks,
    /// Entity vectors
    Entities,
    /// Relation vectors
    Relations,
}

impl ReembedClass {
    /// Processing order
    pub const ALL: [Self; 3] = [Self::Chunks, Self::Entities, Self::Relations];

    /// Class name used in logs and checkpoint files
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Chunks => "chunks",
            Self::Entities => "entities",
            Self::Relations => "relations",
        }
    }

    /// Vector table family
    #[must_use]
    pub const fn vector_class(self) -> VectorClass {
        match self {
            Self::Chunks => VectorClass::Chunks,
            Self::Entities => VectorClass::Entities,
            Self::Relations => VectorClass::Relationships,
        }
    }

    /// Columns read from the source table
    #[must_use]
    pub const fn columns(self) -> &'static [Column] {
        match self {
            Self::Chunks => CHUNK_COLUMNS,
            Self::Entities => ENTITY_COLUMNS,
            Self::Relations => RELATION_COLUMNS,
        }
    }

    /// Turn a source row into an id and the record handed to the target
    /// storage. Rows without content cannot be embedded and yield `None`.
    #[must_use]
    pub fn to_record(self, row: &JsonMap) -> Option<(String, JsonMap)> {
        let id = row.get("id").and_then(Value::as_str)?;
        let content = row
            .get("content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())?;
        let column = |name: &str| row.get(name).cloned().unwrap_or(Value::Null);

        let mut record = JsonMap::new();
        match self {
            Self::Chunks => {
                record.insert("full_doc_id".into(), column("full_doc_id"));
                record.insert("chunk_order_index".into(), column("chunk_order_index"));
                record.insert("tokens".into(), column("tokens"));
                record.insert("content".into(), Value::String(content.to_string()));
                record.insert("file_path".into(), column("file_path"));
            }
            Self::Entities => {
                record.insert("entity_name".into(), column("entity_name"));
                record.insert("content".into(), Value::String(content.to_string()));
                record.insert(
                    "source_id".into(),
                    Value::String(chunk_ids_to_source_id(row.get("chunk_ids"))),
                );
                record.insert("file_path".into(), column("file_path"));
            }
            Self::Relations => {
                record.insert("src_id".into(), column("source_id"));
                record.insert("tgt_id".into(), column("target_id"));
                record.insert("content".into(), Value::String(content.to_string()));
                record.insert(
                    "source_id".into(),
                    Value::String(chunk_ids_to_source_id(row.get("chunk_ids"))),
                );
                record.insert("file_path".into(), column("file_path"));
            }
        }
        Some((id.to_string(), record))
    }
}

/// Join a stored chunk id list with `<SEP>`, dropping empty entries
#[must_use]
pub fn chunk_ids_to_source_id(chunk_ids: Option<&Value>) -> String {
    match chunk_ids {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(FIELD_SEP),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Scan settings shared by every class of a run
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions<'a> {
    /// Workspace to scan
    pub workspace: &'a str,
    /// Rows per page
    pub batch_size: usize,
    /// Directory for per-class checkpoints
    pub checkpoint_dir: Option<&'a Path>,
}

/// Re-embed one class from `source_table` into `sink`
pub async fn reembed_class(
    source: &dyn RowSource,
    class: ReembedClass,
    source_table: &str,
    sink: &dyn VectorSink,
    options: ScanOptions<'_>,
) -> MigrationResult<MigrationStats> {
    let mut stats = MigrationStats::reembed(class.name());
    stats.total = source.count_rows(source_table, options.workspace).await?;
    tracing::info!(class = class.name(), table = source_table, total = stats.total, "Re-embedding");

    let mut scan = TableScan::new(
        source,
        source_table,
        class.columns(),
        options.workspace,
        options.batch_size,
    );

    let mut checkpoints = match options.checkpoint_dir {
        Some(dir) => Some(CheckpointManager::in_dir(dir, class.name(), source_table)?),
        None => None,
    };
    if let Some(manager) = checkpoints.as_mut() {
        if let Some(checkpoint) = manager.load_existing()? {
            tracing::info!(
                class = class.name(),
                after = %checkpoint.last_processed_id,
                "Resuming from checkpoint"
            );
            scan.resume_after(checkpoint.last_processed_id);
            stats.written = checkpoint.processed;
            stats.skipped = checkpoint.skipped;
        }
    }

    let progress = ProgressTracker::new(
        format!("Re-embed {}", class.name()),
        Some(stats.total),
        PROGRESS_INTERVAL,
    );
    progress.increment(stats.written + stats.skipped);

    let result = scan_pages(&mut scan, class, sink, &mut stats, &progress, checkpoints.as_mut()).await;
    if let Err(e) = result {
        stats.log();
        return Err(e);
    }

    if let Some(manager) = checkpoints.as_mut() {
        manager.complete()?;
    }
    stats.log();
    Ok(stats)
}

async fn scan_pages(
    scan: &mut TableScan<'_>,
    class: ReembedClass,
    sink: &dyn VectorSink,
    stats: &mut MigrationStats,
    progress: &ProgressTracker,
    mut checkpoints: Option<&mut CheckpointManager>,
) -> MigrationResult<()> {
    loop {
        let rows = scan.next_page().await?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut batch = JsonMap::new();
        for row in &rows {
            match class.to_record(row) {
                Some((id, record)) => {
                    batch.insert(id, Value::Object(record));
                }
                None => stats.skipped += 1,
            }
        }
        if !batch.is_empty() {
            sink.upsert(&batch).await?;
            stats.written += batch.len() as u64;
        }
        tracing::debug!(
            class = class.name(),
            page = scan.pages(),
            processed = stats.written,
            total = stats.total,
            "Re-embed {} progress: {}/{}",
            class.name(),
            stats.written,
            stats.total
        );

        progress.increment(rows.len() as u64);
        progress.maybe_report();

        if let (Some(manager), Some(cursor)) = (checkpoints.as_deref_mut(), scan.cursor()) {
            manager.save_checkpoint(cursor, stats.written, stats.skipped)?;
        }
    }
}

/// One class scheduled for a run
pub struct ReembedJob<'a> {
    /// Record class
    pub class: ReembedClass,
    /// Table to read
    pub source_table: String,
    /// Storage that embeds and writes
    pub sink: &'a dyn VectorSink,
}

/// Outcome of a multi-class run
#[derive(Debug, Default)]
pub struct ReembedReport {
    /// Stats of the classes that finished
    pub completed: Vec<MigrationStats>,
    /// Classes that failed, with their error
    pub failed: Vec<(ReembedClass, MigrationError)>,
}

impl ReembedReport {
    /// No class failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `jobs` one after another. A failing class is logged and the next one
/// still runs.
pub async fn reembed_classes(
    source: &dyn RowSource,
    jobs: &[ReembedJob<'_>],
    options: ScanOptions<'_>,
) -> ReembedReport {
    let mut report = ReembedReport::default();
    for job in jobs {
        match reembed_class(source, job.class, &job.source_table, job.sink, options).await {
            Ok(stats) => report.completed.push(stats),
            Err(e) => {
                tracing::error!(class = job.class.name(), error = %e, "Re-embedding failed");
                report.failed.push((job.class, e));
            }
        }
    }
    report
}

/// Re-embed every enabled class from the source model's tables into the
/// target model's tables
pub async fn run_reembed(
    config: &ReembedConfig,
    client: &PostgresClient,
    provider: &EmbeddingProvider,
) -> MigrationResult<ReembedReport> {
    let enabled: Vec<ReembedClass> = ReembedClass::ALL
        .into_iter()
        .filter(|class| match class {
            ReembedClass::Chunks => !config.skip_chunks,
            ReembedClass::Entities => !config.skip_entities,
            ReembedClass::Relations => !config.skip_relations,
        })
        .collect();

    let mut targets = Vec::with_capacity(enabled.len());
    for class in &enabled {
        let table = VectorTable::new(
            class.vector_class(),
            Some(&config.target.model),
            config.target.dim,
        );
        let storage = PgVectorStorage::new(
            client,
            table,
            provider,
            &config.workspace,
            config.embedding_batch_num,
        );
        storage.initialize().await?;
        targets.push(storage);
    }

    let jobs: Vec<ReembedJob<'_>> = enabled
        .iter()
        .zip(&targets)
        .map(|(class, target)| ReembedJob {
            class: *class,
            source_table: VectorTable::new(
                class.vector_class(),
                Some(&config.source.model),
                config.source.dim,
            )
            .name()
            .to_string(),
            sink: target,
        })
        .collect();

    let options = ScanOptions {
        workspace: &config.workspace,
        batch_size: config.batch_size,
        checkpoint_dir: config.checkpoint_dir.as_deref(),
    };
    Ok(reembed_classes(client, &jobs, options).await)
}
