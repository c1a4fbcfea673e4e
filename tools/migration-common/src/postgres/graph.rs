use super::schema::{self, GRAPH_EDGES_TABLE, GRAPH_NODES_TABLE};
use crate::JsonMap;
use crate::error::MigrationResult;
use crate::storage::{BatchExecutor, GraphStorage, SqlValue};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

/// Relational property graph: one node table, one edge table
pub struct PgGraphStorage<'a> {
    executor: &'a dyn BatchExecutor,
    workspace: String,
    node_sql: String,
    edge_sql: String,
}

impl<'a> PgGraphStorage<'a> {
    /// Graph storage for `workspace`
    #[must_use]
    pub fn new(executor: &'a dyn BatchExecutor, workspace: &str) -> Self {
        Self {
            executor,
            workspace: workspace.to_string(),
            node_sql: format!(
                "INSERT INTO {GRAPH_NODES_TABLE} (workspace, id, properties, update_time)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (workspace, id) DO UPDATE
                 SET properties = EXCLUDED.properties, update_time = EXCLUDED.update_time"
            ),
            edge_sql: format!(
                "INSERT INTO {GRAPH_EDGES_TABLE} (workspace, source_id, target_id, properties, update_time)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (workspace, source_id, target_id) DO UPDATE
                 SET properties = EXCLUDED.properties, update_time = EXCLUDED.update_time"
            ),
        }
    }

    /// Create both tables if missing
    pub async fn initialize(&self) -> MigrationResult<()> {
        for ddl in schema::graph_tables() {
            self.executor.execute_batch(&ddl, &[Vec::new()]).await?;
        }
        Ok(())
    }
}

fn text(value: &str) -> SqlValue {
    SqlValue::Text(Some(value.to_string()))
}

#[async_trait]
impl GraphStorage for PgGraphStorage<'_> {
    async fn upsert_node(&self, node_id: &str, properties: &JsonMap) -> MigrationResult<()> {
        let row = vec![
            text(&self.workspace),
            text(node_id),
            SqlValue::Json(Value::Object(properties.clone())),
            SqlValue::Timestamp(Utc::now().naive_utc()),
        ];
        self.executor.execute_batch(&self.node_sql, &[row]).await
    }

    async fn upsert_edge(
        &self,
        source_id: &str,
        target_id: &str,
        properties: &JsonMap,
    ) -> MigrationResult<()> {
        let row = vec![
            text(&self.workspace),
            text(source_id),
            text(target_id),
            SqlValue::Json(Value::Object(properties.clone())),
            SqlValue::Timestamp(Utc::now().naive_utc()),
        ];
        self.executor.execute_batch(&self.edge_sql, &[row]).await
    }
}
