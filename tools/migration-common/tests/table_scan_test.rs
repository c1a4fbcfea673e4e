//! Cursor pagination over id-ordered tables

mod common;

use common::MemoryTable;
use migration_common::reembed::ReembedClass;
use migration_common::{MigrationError, TableScan};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::Ordering;

async fn scan_all(table: &MemoryTable, page_size: usize) -> (Vec<String>, u64) {
    let mut scan = TableScan::new(
        table,
        "LIGHTRAG_VDB_CHUNKS",
        ReembedClass::Chunks.columns(),
        "ws",
        page_size,
    );
    let mut ids = Vec::new();
    loop {
        let page = scan.next_page().await.expect("page");
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= page_size);
        ids.extend(
            page.iter()
                .filter_map(|row| row.get("id").and_then(Value::as_str).map(str::to_string)),
        );
    }
    (ids, scan.pages())
}

#[tokio::test]
async fn every_row_is_visited_once() {
    for (rows, page_size) in [(0, 3), (1, 3), (9, 3), (10, 3), (25, 7), (5, 100)] {
        let table = MemoryTable::numbered_chunks("ws", rows);
        let (ids, pages) = scan_all(&table, page_size).await;

        assert_eq!(ids.len(), rows, "rows={rows} page={page_size}");
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), rows, "no duplicates");
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ascending ids");
        assert_eq!(pages, rows.div_ceil(page_size) as u64);
    }
}

#[tokio::test]
async fn scan_is_scoped_to_workspace() {
    let mut table = MemoryTable::numbered_chunks("ws", 4);
    table
        .rows
        .extend(MemoryTable::numbered_chunks("other", 6).rows);
    let (ids, _) = scan_all(&table, 2).await;
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn resume_starts_after_cursor() {
    let table = MemoryTable::numbered_chunks("ws", 10);
    let mut scan = TableScan::new(&table, "t", ReembedClass::Chunks.columns(), "ws", 4);
    scan.resume_after("chunk-0005");
    let page = scan.next_page().await.expect("page");
    assert_eq!(page[0]["id"], json!("chunk-0006"));
    assert_eq!(page.len(), 4);
    assert_eq!(scan.cursor(), Some("chunk-0009"));
}

#[tokio::test]
async fn stalled_cursor_is_an_error() {
    let table = MemoryTable {
        stuck: true,
        ..MemoryTable::numbered_chunks("ws", 10)
    };
    let mut scan = TableScan::new(&table, "t", ReembedClass::Chunks.columns(), "ws", 10);
    assert_eq!(scan.next_page().await.expect("first page").len(), 10);
    let err = scan.next_page().await.expect_err("cursor stuck");
    assert!(matches!(err, MigrationError::Pagination(_)));
}

#[tokio::test]
async fn exhausted_scan_stops_querying() {
    let table = MemoryTable::numbered_chunks("ws", 2);
    let mut scan = TableScan::new(&table, "t", ReembedClass::Chunks.columns(), "ws", 5);
    assert_eq!(scan.next_page().await.expect("rows").len(), 2);
    assert!(scan.next_page().await.expect("end").is_empty());
    assert!(scan.next_page().await.expect("still end").is_empty());
    assert_eq!(table.pages_served.load(Ordering::SeqCst), 2);
}
