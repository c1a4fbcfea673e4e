//! Key-value and document-status replay

use crate::JsonMap;
use crate::error::MigrationResult;
use crate::progress::MigrationStats;
use crate::storage::KvStorage;

/// Split `map` into sub-maps of at most `batch_size` keys, keeping key order
#[must_use]
pub fn partition_map(map: &JsonMap, batch_size: usize) -> Vec<JsonMap> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(map.len().div_ceil(batch_size));
    let mut current = JsonMap::new();
    for (key, value) in map {
        current.insert(key.clone(), value.clone());
        if current.len() >= batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Upsert `data` in batches of `batch_size` keys
pub async fn migrate_kv(
    storage: &dyn KvStorage,
    name: &str,
    data: &JsonMap,
    batch_size: usize,
) -> MigrationResult<MigrationStats> {
    let mut stats = MigrationStats::migration(name);
    stats.total = data.len() as u64;
    for batch in partition_map(data, batch_size) {
        if let Err(e) = storage.upsert(&batch).await {
            stats.log();
            return Err(e);
        }
        stats.written += batch.len() as u64;
    }
    stats.log();
    Ok(stats)
}

/// Upsert every document status record in a single call
pub async fn migrate_doc_status(
    storage: &dyn KvStorage,
    data: &JsonMap,
) -> MigrationResult<MigrationStats> {
    let mut stats = MigrationStats::migration("doc_status");
    stats.total = data.len() as u64;
    if !data.is_empty() {
        if let Err(e) = storage.upsert(data).await {
            stats.log();
            return Err(e);
        }
    }
    stats.written = stats.total;
    stats.log();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numbered(n: usize) -> JsonMap {
        (0..n)
            .map(|i| (format!("key-{i:02}"), json!({ "n": i })))
            .collect()
    }

    #[test]
    fn partitions_keep_order_and_size() {
        let batches = partition_map(&numbered(7), 3);
        let sizes: Vec<_> = batches.iter().map(JsonMap::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let keys: Vec<_> = batches.iter().flat_map(|b| b.keys().cloned()).collect();
        let expected: Vec<_> = numbered(7).keys().cloned().collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn empty_map_has_no_partitions() {
        assert!(partition_map(&JsonMap::new(), 10).is_empty());
    }
}
