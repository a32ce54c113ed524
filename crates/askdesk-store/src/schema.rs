//! Database schema SQL.

/// One row per logical document.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS doc_embeddings (
    id TEXT PRIMARY KEY,
    doc_type TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    url TEXT NOT NULL DEFAULT '',
    embedding BLOB NOT NULL,
    embedding_dim INTEGER NOT NULL,
    search_text TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    content_hash TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_doc_embeddings_type ON doc_embeddings(doc_type);
CREATE INDEX IF NOT EXISTS idx_doc_embeddings_updated ON doc_embeddings(updated_at);
"#;

/// FTS5 index over the pre-tokenized `search_text` column. Tokens are already
/// normalized (lowercase words, CJK bigrams), so plain unicode61 splitting suffices.
pub const FTS_SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS doc_embeddings_fts USING fts5(
    search_text,
    content='doc_embeddings', content_rowid='rowid',
    tokenize='unicode61'
);
"#;

/// Triggers to keep the FTS index in sync with the documents table.
/// `INSERT ... ON CONFLICT DO UPDATE` fires the update trigger.
pub const FTS_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS doc_embeddings_ai AFTER INSERT ON doc_embeddings BEGIN
    INSERT INTO doc_embeddings_fts(rowid, search_text)
    VALUES (new.rowid, new.search_text);
END;

CREATE TRIGGER IF NOT EXISTS doc_embeddings_ad AFTER DELETE ON doc_embeddings BEGIN
    INSERT INTO doc_embeddings_fts(doc_embeddings_fts, rowid, search_text)
    VALUES ('delete', old.rowid, old.search_text);
END;

CREATE TRIGGER IF NOT EXISTS doc_embeddings_au AFTER UPDATE ON doc_embeddings BEGIN
    INSERT INTO doc_embeddings_fts(doc_embeddings_fts, rowid, search_text)
    VALUES ('delete', old.rowid, old.search_text);
    INSERT INTO doc_embeddings_fts(rowid, search_text)
    VALUES (new.rowid, new.search_text);
END;
"#;
