//! Idempotent schema bootstrap for both backends. Each statement is
//! `CREATE ... IF NOT EXISTS`, so `bootstrap` is safe to call on every
//! process start, mirroring the teacher's version-gated migration style but
//! collapsed to one idempotent pass per backend since this schema has no
//! history to replay yet.

pub fn postgres_schema(embedding_dim: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            r#"CREATE TABLE IF NOT EXISTS memories (
                id BIGSERIAL PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ,
                instance_id TEXT NOT NULL,
                project TEXT NOT NULL DEFAULT 'life',
                memory_type TEXT NOT NULL,
                subject TEXT,
                content TEXT NOT NULL,
                keywords TEXT[] NOT NULL DEFAULT '{{}}',
                tags TEXT[] NOT NULL DEFAULT '{{}}',
                importance INTEGER NOT NULL DEFAULT 5 CHECK (importance >= 1 AND importance <= 10),
                source_type TEXT,
                source_context TEXT,
                source_session_id TEXT,
                embedding vector({embedding_dim}),
                last_accessed_at TIMESTAMPTZ,
                access_count INTEGER NOT NULL DEFAULT 0,
                expires_at TIMESTAMPTZ,
                is_archived BOOLEAN NOT NULL DEFAULT false
            )"#
        ),
        "CREATE INDEX IF NOT EXISTS idx_memories_instance ON memories (instance_id)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_instance_project ON memories (instance_id, project)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_project ON memories (project)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_type ON memories (memory_type)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories (importance DESC)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_keywords ON memories USING GIN (keywords)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_tags ON memories USING GIN (tags)".to_string(),
        r#"CREATE TABLE IF NOT EXISTS memory_edges (
            id BIGSERIAL PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            source_id BIGINT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            target_id BIGINT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            relation_type TEXT NOT NULL,
            strength REAL NOT NULL DEFAULT 1.0 CHECK (strength >= 0 AND strength <= 1),
            bidirectional BOOLEAN NOT NULL DEFAULT false,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_by TEXT,
            CHECK (source_id != target_id),
            UNIQUE (source_id, target_id, relation_type)
        )"#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_edges_source_rel ON memory_edges (source_id, relation_type)"
            .to_string(),
        r#"CREATE TABLE IF NOT EXISTS handoff_messages (
            id BIGSERIAL PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            from_instance TEXT NOT NULL,
            to_instance TEXT NOT NULL,
            message_type TEXT NOT NULL,
            subject TEXT,
            content TEXT NOT NULL,
            read_at TIMESTAMPTZ,
            read_by TEXT
        )"#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_handoff_to ON handoff_messages (to_instance)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_handoff_unread ON handoff_messages (to_instance) WHERE read_at IS NULL"
            .to_string(),
    ]
}

/// Best-effort HNSW index creation, applied after the base schema. Some
/// pgvector builds lack HNSW support (or cap dimension); failure here is
/// tolerated and the caller falls back to a sequential scan.
pub fn postgres_hnsw_index() -> &'static str {
    "CREATE INDEX IF NOT EXISTS idx_memories_embedding_hnsw ON memories \
     USING hnsw (embedding vector_cosine_ops)"
}

pub fn sqlite_schema() -> Vec<String> {
    vec![
        r#"CREATE TABLE IF NOT EXISTS memories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            instance_id TEXT NOT NULL,
            project TEXT NOT NULL DEFAULT 'life',
            memory_type TEXT NOT NULL,
            subject TEXT,
            content TEXT NOT NULL,
            keywords TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            importance INTEGER NOT NULL DEFAULT 5 CHECK (importance >= 1 AND importance <= 10),
            source_type TEXT,
            source_context TEXT,
            source_session_id TEXT,
            embedding TEXT,
            last_accessed_at TEXT,
            access_count INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT,
            is_archived INTEGER NOT NULL DEFAULT 0
        )"#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_instance ON memories (instance_id)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_project ON memories (project)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_memories_type ON memories (memory_type)".to_string(),
        r#"CREATE TABLE IF NOT EXISTS memory_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            source_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            target_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            relation_type TEXT NOT NULL,
            strength REAL NOT NULL DEFAULT 1.0 CHECK (strength >= 0 AND strength <= 1),
            bidirectional INTEGER NOT NULL DEFAULT 0,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_by TEXT,
            CHECK (source_id != target_id),
            UNIQUE (source_id, target_id, relation_type)
        )"#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_edges_source_rel ON memory_edges (source_id, relation_type)"
            .to_string(),
        r#"CREATE TABLE IF NOT EXISTS handoff_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            from_instance TEXT NOT NULL,
            to_instance TEXT NOT NULL,
            message_type TEXT NOT NULL,
            subject TEXT,
            content TEXT NOT NULL,
            read_at TEXT,
            read_by TEXT
        )"#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_handoff_to ON handoff_messages (to_instance)".to_string(),
    ]
}
