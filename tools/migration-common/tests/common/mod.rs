//! In-memory implementations of the storage traits
#![allow(dead_code)]

use async_trait::async_trait;
use migration_common::storage::PageQuery;
use migration_common::{
    BatchExecutor, GraphStorage, JsonMap, KvStorage, MigrationError, MigrationResult, RowSource,
    SqlValue, VectorSink,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records every batch; DDL calls are kept apart from data writes.
/// With `fail_on_call` set, that data write (zero based) fails and is not recorded.
#[derive(Default)]
pub struct RecordingExecutor {
    pub batches: Mutex<Vec<(String, Vec<Vec<SqlValue>>)>>,
    pub ddl: Mutex<Vec<String>>,
    pub fail_on_call: Option<usize>,
    data_calls: AtomicUsize,
}

impl RecordingExecutor {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    /// Data writes attempted, including a failed one
    pub fn attempted_writes(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn data_batches(&self) -> Vec<(String, Vec<Vec<SqlValue>>)> {
        self.batches.lock().clone()
    }

    pub fn rows_for(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.batches
            .lock()
            .iter()
            .filter(|(sql, _)| inserts_into(sql, table))
            .flat_map(|(_, rows)| rows.clone())
            .collect()
    }

    pub fn calls_for(&self, table: &str) -> usize {
        self.batches
            .lock()
            .iter()
            .filter(|(sql, _)| inserts_into(sql, table))
            .count()
    }
}

fn inserts_into(sql: &str, table: &str) -> bool {
    sql.strip_prefix("INSERT INTO ")
        .and_then(|rest| rest.strip_prefix(table))
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

#[async_trait]
impl BatchExecutor for RecordingExecutor {
    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> MigrationResult<()> {
        if sql.starts_with("CREATE") {
            self.ddl.lock().push(sql.to_string());
            return Ok(());
        }
        let call = self.data_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            return Err(MigrationError::Database(sqlx::Error::PoolTimedOut));
        }
        self.batches.lock().push((sql.to_string(), rows.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKv {
    pub calls: Mutex<Vec<JsonMap>>,
}

#[async_trait]
impl KvStorage for MemoryKv {
    async fn upsert(&self, data: &JsonMap) -> MigrationResult<()> {
        self.calls.lock().push(data.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGraph {
    pub nodes: Mutex<Vec<(String, JsonMap)>>,
    pub edges: Mutex<Vec<(String, String, JsonMap)>>,
}

#[async_trait]
impl GraphStorage for MemoryGraph {
    async fn upsert_node(&self, node_id: &str, properties: &JsonMap) -> MigrationResult<()> {
        self.nodes
            .lock()
            .push((node_id.to_string(), properties.clone()));
        Ok(())
    }

    async fn upsert_edge(
        &self,
        source_id: &str,
        target_id: &str,
        properties: &JsonMap,
    ) -> MigrationResult<()> {
        self.edges.lock().push((
            source_id.to_string(),
            target_id.to_string(),
            properties.clone(),
        ));
        Ok(())
    }
}

/// Vector sink that stores batches, optionally failing on a given call
#[derive(Default)]
pub struct MemorySink {
    pub batches: Mutex<Vec<JsonMap>>,
    pub fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

impl MemorySink {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.keys().cloned())
            .collect()
    }
}

#[async_trait]
impl VectorSink for MemorySink {
    async fn upsert(&self, records: &JsonMap) -> MigrationResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            return Err(MigrationError::Checkpoint("injected sink failure".into()));
        }
        self.batches.lock().push(records.clone());
        Ok(())
    }
}

/// Table with string primary keys, scoped by workspace
#[derive(Default)]
pub struct MemoryTable {
    pub rows: Vec<(String, JsonMap)>,
    pub pages_served: AtomicUsize,
    /// Ignore the cursor and always return the first page
    pub stuck: bool,
}

impl MemoryTable {
    pub fn with_rows(workspace: &str, rows: impl IntoIterator<Item = Value>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|row| (workspace.to_string(), row.as_object().cloned().expect("row object")))
                .collect(),
            ..Self::default()
        }
    }

    pub fn numbered_chunks(workspace: &str, count: usize) -> Self {
        Self::with_rows(
            workspace,
            (0..count).map(|i| {
                json!({
                    "id": format!("chunk-{i:04}"),
                    "full_doc_id": "doc-1",
                    "chunk_order_index": i,
                    "tokens": 10,
                    "content": format!("text {i}"),
                    "file_path": "doc.md"
                })
            }),
        )
    }
}

#[async_trait]
impl RowSource for MemoryTable {
    async fn count_rows(&self, _table: &str, workspace: &str) -> MigrationResult<u64> {
        Ok(self.rows.iter().filter(|(ws, _)| ws == workspace).count() as u64)
    }

    async fn fetch_page(&self, query: &PageQuery<'_>) -> MigrationResult<Vec<JsonMap>> {
        self.pages_served.fetch_add(1, Ordering::SeqCst);
        let wanted: HashSet<&str> = query.columns.iter().map(|c| c.name).collect();
        let after = if self.stuck { None } else { query.after };

        let mut rows: Vec<&JsonMap> = self
            .rows
            .iter()
            .filter(|(ws, _)| ws == query.workspace)
            .map(|(_, row)| row)
            .filter(|row| {
                let id = row.get("id").and_then(Value::as_str).unwrap_or_default();
                after.is_none_or(|cursor| id > cursor)
            })
            .collect();
        rows.sort_by(|a, b| {
            let id = |r: &JsonMap| r.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            id(a).cmp(&id(b))
        });

        Ok(rows
            .into_iter()
            .take(query.limit)
            .map(|row| {
                row.iter()
                    .filter(|(k, _)| wanted.contains(k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .collect())
    }
}
