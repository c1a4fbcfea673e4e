//! Storage namespaces of a knowledge-store snapshot and their target tables

/// Key-value namespaces, one `kv_store_<name>.json` file each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvNamespace {
    /// Original documents
    FullDocs,
    /// Chunk text and metadata
    TextChunks,
    /// Entities per document
    FullEntities,
    /// Relations per document
    FullRelations,
    /// Chunk references per entity
    EntityChunks,
    /// Chunk references per relation
    RelationChunks,
    /// Cached LLM responses
    LlmResponseCache,
}

impl KvNamespace {
    /// Migration order
    pub const ALL: [Self; 7] = [
        Self::FullDocs,
        Self::TextChunks,
        Self::FullEntities,
        Self::FullRelations,
        Self::EntityChunks,
        Self::RelationChunks,
        Self::LlmResponseCache,
    ];

    /// Namespace name as used in file names
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FullDocs => "full_docs",
            Self::TextChunks => "text_chunks",
            Self::FullEntities => "full_entities",
            Self::FullRelations => "full_relations",
            Self::EntityChunks => "entity_chunks",
            Self::RelationChunks => "relation_chunks",
            Self::LlmResponseCache => "llm_response_cache",
        }
    }

    /// Name used in migration stats
    #[must_use]
    pub const fn stats_name(self) -> &'static str {
        match self {
            Self::LlmResponseCache => "llm_cache",
            other => other.name(),
        }
    }

    /// Snapshot file name
    #[must_use]
    pub fn file_name(self) -> String {
        format!("kv_store_{}.json", self.name())
    }

    /// Target table
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::FullDocs => "LIGHTRAG_DOC_FULL",
            Self::TextChunks => "LIGHTRAG_DOC_CHUNKS",
            Self::FullEntities => "LIGHTRAG_FULL_ENTITIES",
            Self::FullRelations => "LIGHTRAG_FULL_RELATIONS",
            Self::EntityChunks => "LIGHTRAG_ENTITY_CHUNKS",
            Self::RelationChunks => "LIGHTRAG_RELATION_CHUNKS",
            Self::LlmResponseCache => "LIGHTRAG_LLM_CACHE",
        }
    }
}

/// Separator joining chunk ids into a single `source_id` string
pub const FIELD_SEP: &str = "<SEP>";

/// Document status snapshot file
pub const DOC_STATUS_FILE: &str = "kv_store_doc_status.json";

/// Graph snapshot file
pub const GRAPH_FILE: &str = "graph_chunk_entity_relation.graphml";

/// Vector record classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorClass {
    /// Chunk vectors
    Chunks,
    /// Entity vectors
    Entities,
    /// Relationship vectors
    Relationships,
}

impl VectorClass {
    /// Migration order
    pub const ALL: [Self; 3] = [Self::Chunks, Self::Entities, Self::Relationships];

    /// Snapshot file name
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Chunks => "vdb_chunks.json",
            Self::Entities => "vdb_entities.json",
            Self::Relationships => "vdb_relationships.json",
        }
    }

    /// Name used in migration stats
    #[must_use]
    pub const fn stats_name(self) -> &'static str {
        match self {
            Self::Chunks => "vectors_chunks",
            Self::Entities => "vectors_entities",
            Self::Relationships => "vectors_relationships",
        }
    }

    /// Table name before the model suffix
    #[must_use]
    pub const fn base_table(self) -> &'static str {
        match self {
            Self::Chunks => "LIGHTRAG_VDB_CHUNKS",
            Self::Entities => "LIGHTRAG_VDB_ENTITY",
            Self::Relationships => "LIGHTRAG_VDB_RELATION",
        }
    }
}
