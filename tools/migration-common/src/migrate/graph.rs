//! Graph replay

use crate::error::MigrationResult;
use crate::graphml::GraphDocument;
use crate::progress::MigrationStats;
use crate::storage::GraphStorage;
use serde_json::Value;

/// Upsert every node, then every edge, in document order.
///
/// Nodes without an `entity_id` property get their own id. Edge endpoints
/// are not checked against the node set.
pub async fn migrate_graph(
    storage: &dyn GraphStorage,
    graph: &GraphDocument,
) -> MigrationResult<(MigrationStats, MigrationStats)> {
    let mut nodes = MigrationStats::migration("graph_nodes");
    let mut edges = MigrationStats::migration("graph_edges");
    nodes.total = graph.nodes.len() as u64;
    edges.total = graph.edges.len() as u64;

    let result = replay(storage, graph, &mut nodes, &mut edges).await;
    nodes.log();
    edges.log();
    result.map(|()| (nodes, edges))
}

async fn replay(
    storage: &dyn GraphStorage,
    graph: &GraphDocument,
    nodes: &mut MigrationStats,
    edges: &mut MigrationStats,
) -> MigrationResult<()> {
    for node in &graph.nodes {
        let mut properties = node.properties.clone();
        properties
            .entry("entity_id")
            .or_insert_with(|| Value::String(node.id.clone()));
        storage.upsert_node(&node.id, &properties).await?;
        nodes.written += 1;
    }
    for edge in &graph.edges {
        storage
            .upsert_edge(&edge.source, &edge.target, &edge.properties)
            .await?;
        edges.written += 1;
    }
    Ok(())
}
