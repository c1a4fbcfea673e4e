//! Target store contracts consumed by the migration pipelines
//!
//! The PostgreSQL implementations live in [`crate::postgres`]; tests drive the
//! pipelines through in-memory implementations of the same traits.

use crate::JsonMap;
use crate::error::MigrationResult;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;

/// A single bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// `TEXT` / `VARCHAR`
    Text(Option<String>),
    /// `INTEGER`
    Int(Option<i32>),
    /// `VECTOR(n)`
    Vector(Vec<f32>),
    /// `VARCHAR[]`
    TextArray(Vec<String>),
    /// `JSONB`
    Json(Value),
    /// `TIMESTAMP` without time zone
    Timestamp(NaiveDateTime),
}

/// A statement template plus the parameters for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRow {
    /// Parameterised statement shared by every row of a batch
    pub sql: String,
    /// Values bound to `$1..$n`
    pub params: Vec<SqlValue>,
}

impl PreparedRow {
    /// Create a prepared row
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Executes one statement for many parameter tuples.
///
/// Implementations apply their own retry policy; an `Err` means the batch is
/// lost after all attempts.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    /// Run `sql` once per entry of `rows`
    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> MigrationResult<()>;
}

/// Key-value style storage (documents, chunks, caches, doc status).
#[async_trait]
pub trait KvStorage: Send + Sync {
    /// Insert or update every key of `data`
    async fn upsert(&self, data: &JsonMap) -> MigrationResult<()>;
}

/// Property graph storage.
#[async_trait]
pub trait GraphStorage: Send + Sync {
    /// Insert or update a node
    async fn upsert_node(&self, node_id: &str, properties: &JsonMap) -> MigrationResult<()>;

    /// Insert or update an edge; endpoints are not checked
    async fn upsert_edge(
        &self,
        source_id: &str,
        target_id: &str,
        properties: &JsonMap,
    ) -> MigrationResult<()>;
}

/// Vector storage that derives vectors itself from record content.
#[async_trait]
pub trait VectorSink: Send + Sync {
    /// Embed and write a batch keyed by record id
    async fn upsert(&self, records: &JsonMap) -> MigrationResult<()>;
}

/// Column types understood by [`RowSource::fetch_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Text column, decoded to a JSON string or null
    Text,
    /// Integer column, decoded to a JSON number or null
    Int,
    /// Text array column, decoded to a JSON array or null
    TextArray,
}

/// A named, typed column to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: &'static str,
    /// Decoding rule
    pub kind: ColumnKind,
}

impl Column {
    /// Text column
    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }

    /// Integer column
    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Int,
        }
    }

    /// Text array column
    #[must_use]
    pub const fn text_array(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::TextArray,
        }
    }
}

/// One page of an id-ordered, workspace-scoped table scan.
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    /// Table to scan
    pub table: &'a str,
    /// Columns to return; must include `id`
    pub columns: &'a [Column],
    /// Workspace partition
    pub workspace: &'a str,
    /// Exclusive lower bound on `id`
    pub after: Option<&'a str>,
    /// Maximum rows returned
    pub limit: usize,
}

/// Paged read access to existing tables.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Count rows of `table` in `workspace`
    async fn count_rows(&self, table: &str, workspace: &str) -> MigrationResult<u64>;

    /// Fetch rows ordered by `id` ascending, strictly after the cursor
    async fn fetch_page(&self, query: &PageQuery<'_>) -> MigrationResult<Vec<JsonMap>>;
}
