//! A batch write that still fails after retries aborts the pipeline

mod common;

use common::RecordingExecutor;
use migration_common::migrate::{self, migrate_kv, migrate_vectors};
use migration_common::postgres::{PgKvStorage, VectorTable};
use migration_common::{JsonMap, MigrationConfig, MigrationError, VectorClass};
use serde_json::{Value, json};

fn entity_snapshot(count: usize) -> JsonMap {
    let data: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "__id__": format!("ent-{i:02}"),
                "entity_name": format!("Entity {i}"),
                "content": "c",
                "vector": [0.1, 0.2]
            })
        })
        .collect();
    json!({"embedding_dim": 2, "data": data})
        .as_object()
        .cloned()
        .expect("object")
}

#[tokio::test]
async fn vector_migration_stops_at_failed_batch() {
    let executor = RecordingExecutor::failing_on(1);
    let table = VectorTable::new(VectorClass::Entities, Some("m"), 2);

    let err = migrate_vectors(&table, &executor, "ws", &entity_snapshot(25), &JsonMap::new(), 10)
        .await
        .expect_err("second batch fails");

    assert!(matches!(err, MigrationError::Database(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(executor.attempted_writes(), 2, "no batch after the failed one");
    let written = executor.rows_for(table.name());
    assert_eq!(written.len(), 10, "first batch stays written");
}

#[tokio::test]
async fn kv_migration_stops_at_failed_batch() {
    let executor = RecordingExecutor::failing_on(1);
    let storage = PgKvStorage::new(&executor, "LIGHTRAG_DOC_FULL", "ws");
    let data: JsonMap = (0..25).map(|i| (format!("doc-{i:02}"), json!({"i": i}))).collect();

    let err = migrate_kv(&storage, "full_docs", &data, 10)
        .await
        .expect_err("second partition fails");

    assert!(matches!(err, MigrationError::Database(_)));
    assert_eq!(executor.attempted_writes(), 2);
    assert_eq!(executor.rows_for("LIGHTRAG_DOC_FULL").len(), 10);
}

#[tokio::test]
async fn failed_write_skips_later_phases() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("kv_store_full_docs.json"),
        r#"{"doc-1": {"content": "alpha"}}"#,
    )
    .expect("write");
    std::fs::write(
        dir.path().join("kv_store_doc_status.json"),
        r#"{"doc-1": {"status": "processed"}}"#,
    )
    .expect("write");

    let prepared = migrate::prepare(MigrationConfig {
        source_dir: dir.path().to_path_buf(),
        workspace: "ws".to_string(),
        embedding_model: None,
        embedding_dim: Some(4),
        batch_size: 10,
        skip_kv: false,
        skip_doc_status: false,
        skip_vectors: true,
        skip_graph: true,
    })
    .expect("prepare");

    let executor = RecordingExecutor::failing_on(0);
    let err = migrate::execute(&prepared, &executor)
        .await
        .expect_err("first write fails");

    assert_eq!(err.exit_code(), 1);
    assert_eq!(executor.attempted_writes(), 1);
    assert!(executor.data_batches().is_empty());
    assert!(executor.rows_for("LIGHTRAG_DOC_STATUS").is_empty());
}
