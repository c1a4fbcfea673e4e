//! Re-embedding pipeline against in-memory tables and sinks

mod common;

use common::{MemorySink, MemoryTable};
use migration_common::reembed::{
    ReembedClass, ReembedJob, ScanOptions, reembed_class, reembed_classes,
};
use migration_common::{Checkpoint, VectorSink};
use serde_json::json;

fn options(workspace: &str, batch_size: usize) -> ScanOptions<'_> {
    ScanOptions {
        workspace,
        batch_size,
        checkpoint_dir: None,
    }
}

#[tokio::test]
async fn rows_without_content_are_skipped() {
    let table = MemoryTable::with_rows(
        "ws",
        [
            json!({"id": "c1", "content": "first", "tokens": 3}),
            json!({"id": "c2", "content": ""}),
            json!({"id": "c3", "content": null}),
            json!({"id": "c4", "content": "fourth"}),
        ],
    );
    let sink = MemorySink::default();

    let stats = reembed_class(&table, ReembedClass::Chunks, "src", &sink, options("ws", 10))
        .await
        .expect("reembed");

    assert_eq!((stats.total, stats.written, stats.skipped), (4, 2, 2));
    assert!(stats.is_complete());
    assert_eq!(sink.ids(), vec!["c1", "c4"]);
    let batch = &sink.batches.lock()[0];
    assert_eq!(batch["c1"]["tokens"], json!(3));
}

#[tokio::test]
async fn one_upsert_per_page() {
    let table = MemoryTable::numbered_chunks("ws", 7);
    let sink = MemorySink::default();
    let stats = reembed_class(&table, ReembedClass::Chunks, "src", &sink, options("ws", 3))
        .await
        .expect("reembed");
    assert_eq!(stats.written, 7);
    let sizes: Vec<usize> = sink.batches.lock().iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[tokio::test]
async fn entity_chunk_ids_become_source_id() {
    let table = MemoryTable::with_rows(
        "ws",
        [json!({
            "id": "ent-1",
            "entity_name": "Alice",
            "content": "Alice\nresearcher",
            "chunk_ids": ["c1", "c2"],
            "file_path": "a.txt"
        })],
    );
    let sink = MemorySink::default();
    reembed_class(&table, ReembedClass::Entities, "src", &sink, options("ws", 10))
        .await
        .expect("reembed");
    let batch = &sink.batches.lock()[0];
    assert_eq!(batch["ent-1"]["source_id"], json!("c1<SEP>c2"));
    assert_eq!(batch["ent-1"]["entity_name"], json!("Alice"));
}

#[tokio::test]
async fn failing_class_does_not_stop_the_next() {
    let table = MemoryTable::numbered_chunks("ws", 4);
    let broken = MemorySink::failing_on(0);
    let healthy = MemorySink::default();
    let jobs = [
        ReembedJob {
            class: ReembedClass::Chunks,
            source_table: "chunks_src".to_string(),
            sink: &broken as &dyn VectorSink,
        },
        ReembedJob {
            class: ReembedClass::Entities,
            source_table: "entities_src".to_string(),
            sink: &healthy as &dyn VectorSink,
        },
    ];

    let report = reembed_classes(&table, &jobs, options("ws", 10)).await;

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, ReembedClass::Chunks);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].name, "entities");
    assert_eq!(healthy.ids().len(), 4);
}

#[tokio::test]
async fn interrupted_run_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = MemoryTable::numbered_chunks("ws", 10);
    let scan = ScanOptions {
        workspace: "ws",
        batch_size: 4,
        checkpoint_dir: Some(dir.path()),
    };

    // Second page fails after the first was written and checkpointed.
    let first = MemorySink::failing_on(1);
    reembed_class(&table, ReembedClass::Chunks, "src", &first, scan)
        .await
        .expect_err("injected failure");
    assert_eq!(first.ids().len(), 4);

    let checkpoint_path = dir.path().join("reembed_chunks.checkpoint.json");
    let checkpoint = Checkpoint::load(&checkpoint_path).expect("checkpoint");
    assert_eq!(checkpoint.last_processed_id, "chunk-0003");
    assert_eq!(checkpoint.processed, 4);

    let second = MemorySink::default();
    let stats = reembed_class(&table, ReembedClass::Chunks, "src", &second, scan)
        .await
        .expect("resume");

    assert_eq!(second.ids().first().map(String::as_str), Some("chunk-0004"));
    assert_eq!(second.ids().len(), 6);
    assert_eq!(stats.written, 10);
    assert!(stats.is_complete());
    assert!(!checkpoint_path.exists(), "completed class clears its checkpoint");
}

#[tokio::test]
async fn checkpoint_for_another_table_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = MemoryTable::numbered_chunks("ws", 6);
    let scan = ScanOptions {
        workspace: "ws",
        batch_size: 2,
        checkpoint_dir: Some(dir.path()),
    };
    let failing = MemorySink::failing_on(1);
    reembed_class(&table, ReembedClass::Chunks, "old_table", &failing, scan)
        .await
        .expect_err("injected failure");

    let sink = MemorySink::default();
    let err = reembed_class(&table, ReembedClass::Chunks, "new_table", &sink, scan)
        .await
        .expect_err("mismatched checkpoint");
    assert!(err.to_string().contains("checkpoint"));
    assert!(sink.ids().is_empty());
}
