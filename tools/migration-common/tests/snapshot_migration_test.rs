//! File snapshot replay through recording storages

mod common;

use common::{MemoryGraph, MemoryKv, RecordingExecutor};
use migration_common::migrate::{self, migrate_doc_status, migrate_graph, migrate_kv, migrate_vectors};
use migration_common::postgres::VectorTable;
use migration_common::{
    ConfigError, GraphDocument, JsonMap, MigrationConfig, MigrationError, SqlValue, VectorClass,
    encode_vector,
};
use serde_json::{Value, json};
use std::path::Path;

fn object(value: Value) -> JsonMap {
    value.as_object().cloned().expect("object")
}

fn write(dir: &Path, name: &str, value: &Value) {
    std::fs::write(dir.join(name), serde_json::to_string(value).expect("json")).expect("write");
}

fn config(dir: &Path) -> MigrationConfig {
    MigrationConfig {
        source_dir: dir.to_path_buf(),
        workspace: "ws".to_string(),
        embedding_model: Some("test-model".to_string()),
        embedding_dim: None,
        batch_size: 10,
        skip_kv: false,
        skip_doc_status: false,
        skip_vectors: false,
        skip_graph: false,
    }
}

fn text_chunks() -> Value {
    json!({
        "chunk-1": {"tokens": 5, "chunk_order_index": 0, "content": "alpha", "file_path": "a.md"},
        "chunk-2": {"tokens": 6, "chunk_order_index": 1, "content": "beta", "file_path": "a.md"},
        "chunk-3": {"tokens": 7, "chunk_order_index": 2, "content": "gamma", "file_path": "a.md"}
    })
}

#[tokio::test]
async fn chunk_vectors_skip_records_without_id() {
    let vdb = object(json!({
        "embedding_dim": 4,
        "data": [
            {"__id__": "chunk-1", "vector": [0.1, 0.2, 0.3, 0.4]},
            {"vector": [0.5, 0.6, 0.7, 0.8]}
        ]
    }));
    let executor = RecordingExecutor::default();
    let table = VectorTable::new(VectorClass::Chunks, Some("m"), 4);

    let stats = migrate_vectors(&table, &executor, "ws", &vdb, &object(text_chunks()), 10)
        .await
        .expect("migrate");

    assert_eq!((stats.total, stats.written, stats.skipped), (2, 1, 1));
    assert!(stats.is_complete());
    let rows = executor.rows_for(table.name());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], SqlValue::Text(Some("chunk-1".to_string())));
    assert_eq!(rows[0][4], SqlValue::Int(Some(5)), "tokens joined from text_chunks");
    assert_eq!(rows[0][5], SqlValue::Text(Some("alpha".to_string())));
}

#[tokio::test]
async fn vector_batches_and_skip_reasons() {
    let good = encode_vector(&[0.25, -0.5, 1.0, 0.0]);
    let mut data: Vec<Value> = (0..23)
        .map(|i| json!({"__id__": format!("ent-{i}"), "entity_name": "E", "content": "c", "vector": good}))
        .collect();
    data.push(json!({"__id__": "wrong-dim", "vector": [1.0, 2.0]}));
    data.push(json!({"__id__": "bad-b64", "vector": "not-base64!!"}));
    data.push(json!({"__id__": "no-vector"}));
    data.push(json!({"__id__": "", "vector": [1.0, 2.0, 3.0, 4.0]}));
    let vdb = object(json!({"embedding_dim": 4, "data": data}));

    let executor = RecordingExecutor::default();
    let table = VectorTable::new(VectorClass::Entities, Some("m"), 4);
    let stats = migrate_vectors(&table, &executor, "ws", &vdb, &JsonMap::new(), 10)
        .await
        .expect("migrate");

    assert_eq!((stats.total, stats.written, stats.skipped), (27, 23, 4));
    assert_eq!(executor.calls_for(table.name()), 3, "ceil(23 / 10) writes");
    let sizes: Vec<usize> = executor.data_batches().iter().map(|(_, rows)| rows.len()).collect();
    assert_eq!(sizes, vec![10, 10, 3]);
}

#[tokio::test]
async fn relationship_vectors_synthesise_content() {
    let vdb = object(json!({
        "embedding_dim": 2,
        "data": [{
            "__id__": "rel-1",
            "src_id": "Alice",
            "tgt_id": "Lab",
            "keywords": "works_at",
            "description": "employment",
            "source_id": "chunk-1<SEP>chunk-2",
            "vector": [1.0, 0.0]
        }]
    }));
    let executor = RecordingExecutor::default();
    let table = VectorTable::new(VectorClass::Relationships, None, 2);
    migrate_vectors(&table, &executor, "ws", &vdb, &JsonMap::new(), 10)
        .await
        .expect("migrate");

    let rows = executor.rows_for("LIGHTRAG_VDB_RELATION");
    assert_eq!(
        rows[0][4],
        SqlValue::Text(Some("works_at\tAlice\nLab\nemployment".to_string()))
    );
    assert_eq!(
        rows[0][6],
        SqlValue::TextArray(vec!["chunk-1".to_string(), "chunk-2".to_string()])
    );
}

#[tokio::test]
async fn kv_batches_and_doc_status_single_call() {
    let data: JsonMap = (0..25).map(|i| (format!("doc-{i:02}"), json!({"i": i}))).collect();
    let kv = MemoryKv::default();
    let stats = migrate_kv(&kv, "full_docs", &data, 10).await.expect("kv");
    assert_eq!((stats.total, stats.written), (25, 25));
    let sizes: Vec<usize> = kv.calls.lock().iter().map(JsonMap::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);

    let status = MemoryKv::default();
    let stats = migrate_doc_status(&status, &data).await.expect("doc status");
    assert_eq!(stats.written, 25);
    assert_eq!(status.calls.lock().len(), 1);
}

#[tokio::test]
async fn graph_nodes_then_edges_with_entity_id_default() {
    let graph = GraphDocument::parse(
        r#"<graphml>
          <key id="d0" for="node" attr.name="entity_id" attr.type="string"/>
          <key id="d1" for="edge" attr.name="weight" attr.type="double"/>
          <graph edgedefault="undirected">
            <node id="A"><data key="d0">Alpha</data></node>
            <node id="B"/>
            <edge source="A" target="B"><data key="d1">2.0</data></edge>
            <edge source="B" target="Missing"/>
          </graph>
        </graphml>"#,
        Path::new("graph.graphml"),
    )
    .expect("graph");
    let storage = MemoryGraph::default();

    let (nodes, edges) = migrate_graph(&storage, &graph).await.expect("graph");

    assert_eq!((nodes.total, nodes.written), (2, 2));
    assert_eq!((edges.total, edges.written), (2, 2));
    let stored = storage.nodes.lock();
    assert_eq!(stored[0].1["entity_id"], json!("Alpha"));
    assert_eq!(stored[1].1["entity_id"], json!("B"));
    let stored_edges = storage.edges.lock();
    assert_eq!(stored_edges[0].2["weight"], json!(2.0));
    assert_eq!(stored_edges[1].1, "Missing");
}

fn write_snapshot(dir: &Path, dim: usize) {
    write(dir, "kv_store_text_chunks.json", &text_chunks());
    write(dir, "kv_store_full_docs.json", &json!({"doc-1": {"content": "alpha beta gamma"}}));
    write(
        dir,
        "kv_store_doc_status.json",
        &json!({"doc-1": {"status": "processed", "chunks_count": 3}}),
    );
    let vector = encode_vector(&vec![0.5; dim]);
    write(
        dir,
        "vdb_chunks.json",
        &json!({"embedding_dim": dim, "data": [{"__id__": "chunk-1", "vector": vector}]}),
    );
    write(dir, "vdb_entities.json", &json!({"embedding_dim": dim, "data": []}));
    write(dir, "vdb_relationships.json", &json!({"embedding_dim": dim, "data": []}));
    std::fs::write(
        dir.join("graph_chunk_entity_relation.graphml"),
        r#"<graphml><graph><node id="A"/><node id="B"/><edge source="A" target="B"/></graph></graphml>"#,
    )
    .expect("graph");
}

#[tokio::test]
async fn full_snapshot_replays_every_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_snapshot(dir.path(), 4);

    let prepared = migrate::prepare(config(dir.path())).expect("prepare");
    assert_eq!(prepared.embedding_dim(), 4);
    let executor = RecordingExecutor::default();
    let stats = migrate::execute(&prepared, &executor).await.expect("execute");

    let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "full_docs",
            "text_chunks",
            "full_entities",
            "full_relations",
            "entity_chunks",
            "relation_chunks",
            "llm_cache",
            "doc_status",
            "vectors_chunks",
            "vectors_entities",
            "vectors_relationships",
            "graph_nodes",
            "graph_edges",
        ]
    );
    assert!(stats.iter().all(|s| s.is_complete()));

    assert_eq!(executor.rows_for("LIGHTRAG_DOC_CHUNKS").len(), 3);
    assert_eq!(executor.rows_for("LIGHTRAG_DOC_STATUS").len(), 1);
    assert_eq!(
        executor.rows_for("LIGHTRAG_VDB_CHUNKS_test_model_4d").len(),
        1
    );
    assert_eq!(executor.rows_for("LIGHTRAG_GRAPH_EDGES").len(), 1);
    assert!(
        executor
            .ddl
            .lock()
            .iter()
            .any(|ddl| ddl.contains("LIGHTRAG_VDB_ENTITY_test_model_4d") && ddl.contains("VECTOR(4)"))
    );
}

#[tokio::test]
async fn skip_flags_leave_stores_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_snapshot(dir.path(), 4);
    let prepared = migrate::prepare(MigrationConfig {
        skip_kv: true,
        skip_vectors: true,
        skip_graph: true,
        ..config(dir.path())
    })
    .expect("prepare");
    let executor = RecordingExecutor::default();
    let stats = migrate::execute(&prepared, &executor).await.expect("execute");

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].name, "doc_status");
    assert!(executor.rows_for("LIGHTRAG_DOC_FULL").is_empty());
}

#[test]
fn dimension_mismatch_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_snapshot(dir.path(), 4);
    let err = migrate::prepare(MigrationConfig {
        embedding_dim: Some(8),
        ..config(dir.path())
    })
    .expect_err("mismatch");

    assert!(matches!(
        err,
        MigrationError::Config(ConfigError::DimensionMismatch {
            file: Some(4),
            arg: Some(8)
        })
    ));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn missing_source_dir_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = migrate::prepare(config(&dir.path().join("absent"))).expect_err("missing");
    assert!(matches!(err, MigrationError::Config(ConfigError::MissingSource(_))));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn corrupt_vector_snapshot_fails_before_connecting() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_snapshot(dir.path(), 4);
    std::fs::write(dir.path().join("vdb_entities.json"), "not json").expect("write");
    let err = migrate::prepare(config(dir.path())).expect_err("parse");
    assert!(matches!(err, MigrationError::Parse { .. }));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn disagreeing_entity_snapshot_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_snapshot(dir.path(), 4);
    write(dir.path(), "vdb_entities.json", &json!({"embedding_dim": 8, "data": []}));

    let err = migrate::prepare(config(dir.path())).expect_err("mismatch");
    assert!(matches!(
        err,
        MigrationError::Config(ConfigError::DimensionMismatch {
            file: Some(8),
            arg: Some(4)
        })
    ));
    assert_eq!(err.exit_code(), 2);
}
