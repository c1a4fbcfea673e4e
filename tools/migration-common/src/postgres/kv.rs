use super::schema;
use crate::JsonMap;
use crate::error::MigrationResult;
use crate::storage::{BatchExecutor, KvStorage, SqlValue};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

/// JSONB key-value storage, one table per namespace
pub struct PgKvStorage<'a> {
    executor: &'a dyn BatchExecutor,
    table: &'static str,
    workspace: String,
}

impl<'a> PgKvStorage<'a> {
    /// Storage writing to `table` within `workspace`
    #[must_use]
    pub fn new(executor: &'a dyn BatchExecutor, table: &'static str, workspace: &str) -> Self {
        Self {
            executor,
            table,
            workspace: workspace.to_string(),
        }
    }

    /// Create the table if missing
    pub async fn initialize(&self) -> MigrationResult<()> {
        self.executor
            .execute_batch(&schema::kv_table(self.table), &[Vec::new()])
            .await
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (workspace, id, data, update_time) VALUES ($1, $2, $3, $4)
             ON CONFLICT (workspace, id) DO UPDATE
             SET data = EXCLUDED.data, update_time = EXCLUDED.update_time",
            self.table
        )
    }
}

#[async_trait]
impl KvStorage for PgKvStorage<'_> {
    async fn upsert(&self, data: &JsonMap) -> MigrationResult<()> {
        let now = Utc::now().naive_utc();
        let rows: Vec<Vec<SqlValue>> = data
            .iter()
            .map(|(id, value)| {
                vec![
                    SqlValue::Text(Some(self.workspace.clone())),
                    SqlValue::Text(Some(id.clone())),
                    SqlValue::Json(value.clone()),
                    SqlValue::Timestamp(now),
                ]
            })
            .collect();
        self.executor.execute_batch(&self.upsert_sql(), &rows).await
    }
}

/// Document status storage
pub struct PgDocStatusStorage<'a> {
    executor: &'a dyn BatchExecutor,
    workspace: String,
}

impl<'a> PgDocStatusStorage<'a> {
    /// Storage for `workspace`
    #[must_use]
    pub fn new(executor: &'a dyn BatchExecutor, workspace: &str) -> Self {
        Self {
            executor,
            workspace: workspace.to_string(),
        }
    }

    /// Create the table if missing
    pub async fn initialize(&self) -> MigrationResult<()> {
        self.executor
            .execute_batch(&schema::doc_status_table(), &[Vec::new()])
            .await
    }

    fn row(&self, id: &str, doc: &Value, now: chrono::NaiveDateTime) -> Vec<SqlValue> {
        let text = |key: &str| SqlValue::Text(doc.get(key).and_then(text_value));
        let int = |key: &str| {
            SqlValue::Int(
                doc.get(key)
                    .and_then(Value::as_i64)
                    .and_then(|v| i32::try_from(v).ok()),
            )
        };
        vec![
            SqlValue::Text(Some(self.workspace.clone())),
            SqlValue::Text(Some(id.to_string())),
            text("status"),
            text("file_path"),
            int("chunks_count"),
            text("content_summary"),
            int("content_length"),
            text("track_id"),
            text("error_msg"),
            SqlValue::Json(doc.clone()),
            SqlValue::Timestamp(now),
        ]
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

const DOC_STATUS_UPSERT: &str = "INSERT INTO LIGHTRAG_DOC_STATUS
    (workspace, id, status, file_path, chunks_count, content_summary, content_length,
     track_id, error_msg, data, update_time)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (workspace, id) DO UPDATE SET
        status = EXCLUDED.status,
        file_path = EXCLUDED.file_path,
        chunks_count = EXCLUDED.chunks_count,
        content_summary = EXCLUDED.content_summary,
        content_length = EXCLUDED.content_length,
        track_id = EXCLUDED.track_id,
        error_msg = EXCLUDED.error_msg,
        data = EXCLUDED.data,
        update_time = EXCLUDED.update_time";

#[async_trait]
impl KvStorage for PgDocStatusStorage<'_> {
    async fn upsert(&self, data: &JsonMap) -> MigrationResult<()> {
        let now = Utc::now().naive_utc();
        let rows: Vec<_> = data.iter().map(|(id, doc)| self.row(id, doc, now)).collect();
        self.executor.execute_batch(DOC_STATUS_UPSERT, &rows).await
    }
}
