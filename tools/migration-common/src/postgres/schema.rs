//! `CREATE TABLE IF NOT EXISTS` statements for the target tables

use crate::namespace::VectorClass;

/// Generic JSONB key-value table
#[must_use]
pub fn kv_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            workspace VARCHAR(255) NOT NULL,
            id VARCHAR(255) NOT NULL,
            data JSONB,
            create_time TIMESTAMP(0) DEFAULT CURRENT_TIMESTAMP,
            update_time TIMESTAMP(0) DEFAULT CURRENT_TIMESTAMP,
            CONSTRAINT {table}_PK PRIMARY KEY (workspace, id)
        )"
    )
}

/// Document status table
pub const DOC_STATUS_TABLE: &str = "LIGHTRAG_DOC_STATUS";

/// Document status table with the queryable fields broken out
#[must_use]
pub fn doc_status_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {DOC_STATUS_TABLE} (
            workspace VARCHAR(255) NOT NULL,
            id VARCHAR(255) NOT NULL,
            status VARCHAR(64),
            file_path TEXT,
            chunks_count INTEGER,
            content_summary TEXT,
            content_length INTEGER,
            track_id VARCHAR(255),
            error_msg TEXT,
            data JSONB,
            update_time TIMESTAMP(0) DEFAULT CURRENT_TIMESTAMP,
            CONSTRAINT {DOC_STATUS_TABLE}_PK PRIMARY KEY (workspace, id)
        )"
    )
}

/// Graph node table
pub const GRAPH_NODES_TABLE: &str = "LIGHTRAG_GRAPH_NODES";

/// Graph edge table
pub const GRAPH_EDGES_TABLE: &str = "LIGHTRAG_GRAPH_EDGES";

/// Both graph tables
#[must_use]
pub fn graph_tables() -> [String; 2] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {GRAPH_NODES_TABLE} (
                workspace VARCHAR(255) NOT NULL,
                id VARCHAR(512) NOT NULL,
                properties JSONB,
                update_time TIMESTAMP(0) DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT {GRAPH_NODES_TABLE}_PK PRIMARY KEY (workspace, id)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {GRAPH_EDGES_TABLE} (
                workspace VARCHAR(255) NOT NULL,
                source_id VARCHAR(512) NOT NULL,
                target_id VARCHAR(512) NOT NULL,
                properties JSONB,
                update_time TIMESTAMP(0) DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT {GRAPH_EDGES_TABLE}_PK PRIMARY KEY (workspace, source_id, target_id)
            )"
        ),
    ]
}

/// pgvector extension
pub const VECTOR_EXTENSION: &str = "CREATE EXTENSION IF NOT EXISTS vector";

/// Vector table for `class` with `dim`-wide vectors
#[must_use]
pub fn vector_table(class: VectorClass, table: &str, dim: usize) -> String {
    let columns = match class {
        VectorClass::Chunks => {
            "full_doc_id VARCHAR(256),
            chunk_order_index INTEGER,
            tokens INTEGER,"
        }
        VectorClass::Entities => "entity_name VARCHAR(512),",
        VectorClass::Relationships => {
            "source_id VARCHAR(512),
            target_id VARCHAR(512),"
        }
    };
    let chunk_ids = match class {
        VectorClass::Chunks => "",
        VectorClass::Entities | VectorClass::Relationships => "chunk_ids VARCHAR(255)[] NULL,",
    };
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            workspace VARCHAR(255) NOT NULL,
            id VARCHAR(255) NOT NULL,
            {columns}
            content TEXT,
            content_vector VECTOR({dim}),
            {chunk_ids}
            file_path TEXT NULL,
            create_time TIMESTAMP(0) DEFAULT CURRENT_TIMESTAMP,
            update_time TIMESTAMP(0) DEFAULT CURRENT_TIMESTAMP,
            CONSTRAINT {table}_PK PRIMARY KEY (workspace, id)
        )"
    )
}
