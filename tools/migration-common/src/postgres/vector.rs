use super::schema;
use crate::JsonMap;
use crate::embedding::EmbeddingProvider;
use crate::error::MigrationResult;
use crate::namespace::{FIELD_SEP, VectorClass};
use crate::storage::{BatchExecutor, PreparedRow, SqlValue, VectorSink};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde_json::Value;

/// Table name for `base` bound to an embedding model.
///
/// The model is lower-cased and every character outside `[a-z0-9]` becomes
/// `_`; without a model the base table is used.
#[must_use]
pub fn vector_table_name(base: &str, model: Option<&str>, dim: usize) -> String {
    match model.map(str::trim).filter(|m| !m.is_empty()) {
        Some(model) => {
            let suffix: String = model
                .to_lowercase()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("{base}_{suffix}_{dim}d")
        }
        None => base.to_string(),
    }
}

/// Class-specific columns of a vector row
#[derive(Debug, Clone, PartialEq)]
pub enum VectorFields {
    /// Chunk row
    Chunk {
        /// Owning document
        full_doc_id: Option<String>,
        /// Position within the document
        chunk_order_index: Option<i32>,
        /// Token count
        tokens: Option<i32>,
        /// Source file
        file_path: Option<String>,
    },
    /// Entity row
    Entity {
        /// Entity name
        entity_name: Option<String>,
        /// Contributing chunks
        chunk_ids: Vec<String>,
        /// Source file
        file_path: Option<String>,
    },
    /// Relation row
    Relation {
        /// Source entity
        src_id: Option<String>,
        /// Target entity
        tgt_id: Option<String>,
        /// Contributing chunks
        chunk_ids: Vec<String>,
        /// Source file
        file_path: Option<String>,
    },
}

/// One vector row before it is bound to a statement
#[derive(Debug, Clone, PartialEq)]
pub struct VectorItem {
    /// Primary key
    pub id: String,
    /// Text the vector was computed from
    pub content: String,
    /// Embedding
    pub vector: Vec<f32>,
    /// Class-specific columns
    pub fields: VectorFields,
}

impl VectorItem {
    /// Build from a field map shaped like the vector snapshot records.
    ///
    /// Entities and relations carry their chunk ids as one `<SEP>`-joined
    /// `source_id` string; relations name their endpoints `src_id`/`tgt_id`.
    #[must_use]
    pub fn from_fields(class: VectorClass, id: &str, fields: &JsonMap, vector: Vec<f32>) -> Self {
        let content = string_field(fields, "content").unwrap_or_default();
        let file_path = string_field(fields, "file_path");
        let fields = match class {
            VectorClass::Chunks => VectorFields::Chunk {
                full_doc_id: string_field(fields, "full_doc_id"),
                chunk_order_index: int_field(fields, "chunk_order_index"),
                tokens: int_field(fields, "tokens"),
                file_path,
            },
            VectorClass::Entities => VectorFields::Entity {
                entity_name: string_field(fields, "entity_name"),
                chunk_ids: split_chunk_ids(fields.get("source_id")),
                file_path,
            },
            VectorClass::Relationships => VectorFields::Relation {
                src_id: string_field(fields, "src_id"),
                tgt_id: string_field(fields, "tgt_id"),
                chunk_ids: split_chunk_ids(fields.get("source_id")),
                file_path,
            },
        };
        Self {
            id: id.to_string(),
            content,
            vector,
            fields,
        }
    }
}

/// String value; other non-null scalars are stringified
pub(crate) fn string_field(map: &JsonMap, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn int_field(map: &JsonMap, key: &str) -> Option<i32> {
    match map.get(key)? {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn split_chunk_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(FIELD_SEP)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A model-specific vector table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorTable {
    class: VectorClass,
    name: String,
    dim: usize,
    upsert_sql: String,
}

impl VectorTable {
    /// Table for `class` bound to `model` and `dim`
    #[must_use]
    pub fn new(class: VectorClass, model: Option<&str>, dim: usize) -> Self {
        let name = vector_table_name(class.base_table(), model, dim);
        let upsert_sql = upsert_sql(class, &name);
        Self {
            class,
            name,
            dim,
            upsert_sql,
        }
    }

    /// Record class
    #[must_use]
    pub const fn class(&self) -> VectorClass {
        self.class
    }

    /// Table name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vector dimension
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Statement plus parameters upserting `item`
    #[must_use]
    pub fn build_row(&self, workspace: &str, item: &VectorItem, now: NaiveDateTime) -> PreparedRow {
        let mut params = vec![
            SqlValue::Text(Some(workspace.to_string())),
            SqlValue::Text(Some(item.id.clone())),
        ];
        let file_path = match &item.fields {
            VectorFields::Chunk {
                full_doc_id,
                chunk_order_index,
                tokens,
                file_path,
            } => {
                params.push(SqlValue::Text(full_doc_id.clone()));
                params.push(SqlValue::Int(*chunk_order_index));
                params.push(SqlValue::Int(*tokens));
                params.push(SqlValue::Text(Some(item.content.clone())));
                params.push(SqlValue::Vector(item.vector.clone()));
                file_path
            }
            VectorFields::Entity {
                entity_name,
                chunk_ids,
                file_path,
            } => {
                params.push(SqlValue::Text(entity_name.clone()));
                params.push(SqlValue::Text(Some(item.content.clone())));
                params.push(SqlValue::Vector(item.vector.clone()));
                params.push(SqlValue::TextArray(chunk_ids.clone()));
                file_path
            }
            VectorFields::Relation {
                src_id,
                tgt_id,
                chunk_ids,
                file_path,
            } => {
                params.push(SqlValue::Text(src_id.clone()));
                params.push(SqlValue::Text(tgt_id.clone()));
                params.push(SqlValue::Text(Some(item.content.clone())));
                params.push(SqlValue::Vector(item.vector.clone()));
                params.push(SqlValue::TextArray(chunk_ids.clone()));
                file_path
            }
        };
        params.push(SqlValue::Text(file_path.clone()));
        params.push(SqlValue::Timestamp(now));
        params.push(SqlValue::Timestamp(now));
        PreparedRow::new(self.upsert_sql.clone(), params)
    }
}

fn upsert_sql(class: VectorClass, table: &str) -> String {
    let columns: &[&str] = match class {
        VectorClass::Chunks => &[
            "full_doc_id",
            "chunk_order_index",
            "tokens",
            "content",
            "content_vector",
        ],
        VectorClass::Entities => &["entity_name", "content", "content_vector", "chunk_ids"],
        VectorClass::Relationships => &[
            "source_id",
            "target_id",
            "content",
            "content_vector",
            "chunk_ids",
        ],
    };
    let mut all = vec!["workspace", "id"];
    all.extend_from_slice(columns);
    all.extend_from_slice(&["file_path", "create_time", "update_time"]);

    let placeholders = (1..=all.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = all
        .iter()
        .filter(|c| !matches!(**c, "workspace" | "id" | "create_time"))
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) ON CONFLICT (workspace, id) DO UPDATE SET {updates}",
        all.join(", ")
    )
}

/// Vector storage that embeds record content before writing
pub struct PgVectorStorage<'a> {
    executor: &'a dyn BatchExecutor,
    table: VectorTable,
    provider: &'a EmbeddingProvider,
    workspace: String,
    embedding_batch_num: usize,
}

impl<'a> PgVectorStorage<'a> {
    /// Storage writing `table` with vectors from `provider`
    #[must_use]
    pub fn new(
        executor: &'a dyn BatchExecutor,
        table: VectorTable,
        provider: &'a EmbeddingProvider,
        workspace: &str,
        embedding_batch_num: usize,
    ) -> Self {
        Self {
            executor,
            table,
            provider,
            workspace: workspace.to_string(),
            embedding_batch_num: embedding_batch_num.max(1),
        }
    }

    /// Target table
    #[must_use]
    pub const fn table(&self) -> &VectorTable {
        &self.table
    }

    /// Create the extension and the table if missing
    pub async fn initialize(&self) -> MigrationResult<()> {
        self.executor
            .execute_batch(schema::VECTOR_EXTENSION, &[Vec::new()])
            .await?;
        let ddl = schema::vector_table(self.table.class, &self.table.name, self.table.dim);
        self.executor.execute_batch(&ddl, &[Vec::new()]).await?;
        tracing::info!(table = %self.table.name, dim = self.table.dim, "Vector table ready");
        Ok(())
    }
}

#[async_trait]
impl VectorSink for PgVectorStorage<'_> {
    async fn upsert(&self, records: &JsonMap) -> MigrationResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let entries: Vec<(&String, JsonMap)> = records
            .iter()
            .map(|(id, value)| (id, value.as_object().cloned().unwrap_or_default()))
            .collect();
        let contents: Vec<String> = entries
            .iter()
            .map(|(_, fields)| string_field(fields, "content").unwrap_or_default())
            .collect();

        let mut vectors = Vec::with_capacity(contents.len());
        for group in contents.chunks(self.embedding_batch_num) {
            vectors.extend(self.provider.embed(group).await?);
        }
        tracing::debug!(
            table = %self.table.name,
            records = entries.len(),
            requests = contents.len().div_ceil(self.embedding_batch_num),
            "Embedded batch"
        );

        let now = Utc::now().naive_utc();
        let rows: Vec<Vec<SqlValue>> = entries
            .into_iter()
            .zip(vectors)
            .map(|((id, fields), vector)| {
                let item = VectorItem::from_fields(self.table.class, id, &fields, vector);
                self.table.build_row(&self.workspace, &item, now).params
            })
            .collect();
        self.executor.execute_batch(&self.table.upsert_sql, &rows).await
    }
}
