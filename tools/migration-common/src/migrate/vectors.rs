//! Vector snapshot replay
//!
//! Snapshot vectors are written as they are; nothing is re-embedded here.

use crate::JsonMap;
use crate::batch_writer::BatchWriter;
use crate::error::MigrationResult;
use crate::namespace::VectorClass;
use crate::postgres::{VectorItem, VectorTable};
use crate::progress::MigrationStats;
use crate::storage::BatchExecutor;
use crate::vector_codec::decode_vector;
use chrono::Utc;
use serde_json::Value;

const MISSING_ENDPOINT: &str = "None";

/// Content for a relationship record that has none of its own.
///
/// Other readers parse this layout, so it must not change. Missing keywords
/// or description render empty; a missing endpoint renders as `None`.
#[must_use]
pub fn relationship_fallback_content(record: &JsonMap) -> String {
    let render = |key: &str, missing: &str| match record.get(key) {
        None | Some(Value::Null) => missing.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    format!(
        "{}\t{}\n{}\n{}",
        render("keywords", ""),
        render("src_id", MISSING_ENDPOINT),
        render("tgt_id", MISSING_ENDPOINT),
        render("description", "")
    )
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn meta_field<'a>(meta: Option<&'a JsonMap>, key: &str) -> Option<&'a Value> {
    meta.and_then(|m| m.get(key))
}

fn copy_field(target: &mut JsonMap, key: &str, value: Option<&Value>) {
    target.insert(key.to_string(), value.cloned().unwrap_or(Value::Null));
}

/// Field map for one snapshot record, joined with chunk metadata for chunks
fn assemble_fields(class: VectorClass, record: &JsonMap, text_chunks: &JsonMap, id: &str) -> JsonMap {
    let mut fields = JsonMap::new();
    match class {
        VectorClass::Chunks => {
            let meta = text_chunks.get(id).and_then(Value::as_object);
            copy_field(&mut fields, "tokens", meta_field(meta, "tokens"));
            copy_field(&mut fields, "chunk_order_index", meta_field(meta, "chunk_order_index"));
            copy_field(
                &mut fields,
                "full_doc_id",
                record
                    .get("full_doc_id")
                    .or_else(|| meta_field(meta, "full_doc_id")),
            );
            let content = non_empty_str(record.get("content"))
                .or_else(|| non_empty_str(meta_field(meta, "content")))
                .unwrap_or_default();
            fields.insert("content".to_string(), Value::String(content.to_string()));
            let file_path = if non_empty_str(record.get("file_path")).is_some() {
                record.get("file_path")
            } else {
                meta_field(meta, "file_path")
            };
            copy_field(&mut fields, "file_path", file_path);
        }
        VectorClass::Entities => {
            copy_field(&mut fields, "entity_name", record.get("entity_name"));
            copy_field(&mut fields, "content", record.get("content"));
            fields.insert(
                "source_id".to_string(),
                record
                    .get("source_id")
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new())),
            );
            copy_field(&mut fields, "file_path", record.get("file_path"));
        }
        VectorClass::Relationships => {
            copy_field(&mut fields, "src_id", record.get("src_id"));
            copy_field(&mut fields, "tgt_id", record.get("tgt_id"));
            let content = non_empty_str(record.get("content"))
                .map_or_else(|| relationship_fallback_content(record), str::to_string);
            fields.insert("content".to_string(), Value::String(content));
            fields.insert(
                "source_id".to_string(),
                record
                    .get("source_id")
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new())),
            );
            copy_field(&mut fields, "file_path", record.get("file_path"));
        }
    }
    fields
}

/// Replay the `data` records of a vector snapshot into `table`.
///
/// Records without an id or with an undecodable vector are skipped and
/// counted; everything else is written in batches of `batch_size`.
pub async fn migrate_vectors(
    table: &VectorTable,
    executor: &dyn BatchExecutor,
    workspace: &str,
    vdb: &JsonMap,
    text_chunks: &JsonMap,
    batch_size: usize,
) -> MigrationResult<MigrationStats> {
    let class = table.class();
    let mut stats = MigrationStats::migration(class.stats_name());
    let mut writer = BatchWriter::new(executor, batch_size);
    let now = Utc::now().naive_utc();
    let records = vdb
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for record in records {
        stats.total += 1;
        let Some(record) = record.as_object() else {
            tracing::warn!(table = %table.name(), "Vector record is not an object, skipping");
            stats.skipped += 1;
            continue;
        };
        let Some(id) = non_empty_str(record.get("__id__")) else {
            tracing::warn!(table = %table.name(), "Vector record without __id__, skipping");
            stats.skipped += 1;
            continue;
        };
        let Ok(vector) = decode_vector(record.get("vector"), table.dim(), id) else {
            stats.skipped += 1;
            continue;
        };

        let fields = assemble_fields(class, record, text_chunks, id);
        let item = VectorItem::from_fields(class, id, &fields, vector);
        match writer.push(table.build_row(workspace, &item, now)).await {
            Ok(written) => stats.written += written as u64,
            Err(e) => {
                stats.log();
                return Err(e);
            }
        }
    }

    match writer.finish().await {
        Ok(written) => stats.written += written as u64,
        Err(e) => {
            stats.log();
            return Err(e);
        }
    }
    stats.log();
    Ok(stats)
}
