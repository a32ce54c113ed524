//! SQLite-backed document store with an FTS5 keyword index and cosine vector search.
//!
//! Every write is a single statement, so a row moves from its old state to its
//! new state atomically even when two syncs race on the same id.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ndarray::Array2;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::embedding::{blob_to_vec, normalized, vec_to_blob};
use crate::lexical::fts_match_query;
use crate::schema::{FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, SCHEMA_SQL};
use crate::types::*;
use askdesk_core::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite store holding one embedding record per logical document.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    embedding_dim: usize,
    /// Row-normalized embeddings for cosine search, rebuilt lazily after writes.
    embedding_matrix: Mutex<EmbeddingMatrix>,
    /// Bumped under the connection lock by every write that changes embeddings.
    write_generation: AtomicU64,
}

struct EmbeddingMatrix {
    /// Normalized embeddings, shape (N, dim).
    matrix: Array2<f32>,
    ids: Vec<String>,
    types: Vec<DocType>,
    /// Write generation the rows were read at; `None` before the first load.
    generation: Option<u64>,
}

impl EmbeddingMatrix {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == Some(generation)
    }
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/vectordb/`). The file will be `db_dir/askdesk.db`.
    pub fn open(db_dir: impl AsRef<Path>, embedding_dim: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("askdesk.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            embedding_dim,
            embedding_matrix: Mutex::new(EmbeddingMatrix {
                matrix: Array2::zeros((0, embedding_dim)),
                ids: Vec::new(),
                types: Vec::new(),
                generation: None,
            }),
            write_generation: AtomicU64::new(0),
        };

        store.load_embedding_matrix()?;

        info!(
            "SqliteStore initialized: {} documents, dim={}, path={}",
            store.count()?,
            embedding_dim,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA cache_size = -65536;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}\n{}", SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Insert or replace a record by id in one statement.
    pub fn upsert(&self, record: &EmbeddingRecord) -> Result<()> {
        if record.embedding.len() != self.embedding_dim {
            return Err(Error::Validation(format!(
                "embedding for {} has dimension {}, store expects {}",
                record.id,
                record.embedding.len(),
                self.embedding_dim
            )));
        }
        let meta_json = serde_json::to_string(&record.metadata)?;
        let blob = vec_to_blob(&record.embedding);

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO doc_embeddings (id, doc_type, title, content, url, embedding, \
             embedding_dim, search_text, metadata_json, content_hash, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
             ON CONFLICT(id) DO UPDATE SET \
                doc_type = excluded.doc_type, \
                title = excluded.title, \
                content = excluded.content, \
                url = excluded.url, \
                embedding = excluded.embedding, \
                embedding_dim = excluded.embedding_dim, \
                search_text = excluded.search_text, \
                metadata_json = excluded.metadata_json, \
                content_hash = excluded.content_hash, \
                updated_at = excluded.updated_at",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            record.id,
            record.doc_type.as_str(),
            record.title,
            record.content,
            record.url,
            blob,
            self.embedding_dim as i64,
            record.search_text,
            meta_json,
            record.content_hash,
            record.updated_at,
        ])
        .map_err(|e| Error::Database(e.to_string()))?;
        self.write_generation.fetch_add(1, Ordering::SeqCst);
        drop(conn);

        debug!("Upserted {} ({})", record.id, record.doc_type);
        Ok(())
    }

    /// Refresh url/metadata/timestamp of an existing row whose content is unchanged.
    /// Returns false if the row does not exist.
    pub fn touch_metadata(
        &self,
        id: &str,
        url: &str,
        metadata: &RecordMetadata,
        updated_at: i64,
    ) -> Result<bool> {
        let meta_json = serde_json::to_string(metadata)?;
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE doc_embeddings SET url = ?1, metadata_json = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![url, meta_json, updated_at, id],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Delete by id. Deleting an absent id is not an error; returns whether a row existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM doc_embeddings WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(e.to_string()))?;
        if count > 0 {
            self.write_generation.fetch_add(1, Ordering::SeqCst);
        }
        drop(conn);
        if count > 0 {
            debug!("Deleted {}", id);
        }
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM doc_embeddings WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id], Self::row_to_record)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// Fetch records by type and/or id, ordered by id.
    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<EmbeddingRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM doc_embeddings \
                 WHERE (?1 IS NULL OR doc_type = ?1) AND (?2 IS NULL OR id = ?2) \
                 ORDER BY id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![filter.doc_type.map(|t| t.as_str()), filter.id.as_deref()],
                Self::row_to_record,
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Ids currently stored for a type (used for orphan reconciliation).
    pub fn ids_for_type(&self, doc_type: DocType) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM doc_embeddings WHERE doc_type = ?1 ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![doc_type.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// `id -> content_hash` for every stored row of a type.
    pub fn hashes_for_type(&self, doc_type: DocType) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, content_hash FROM doc_embeddings WHERE doc_type = ?1")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![doc_type.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM doc_embeddings", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ---------------------------------------------------------------
    // Keyword candidates (FTS5)
    // ---------------------------------------------------------------

    /// Rows whose `search_text` contains at least one of the query tokens.
    pub fn keyword_candidates(
        &self,
        tokens: &[String],
        doc_type: Option<DocType>,
    ) -> Result<Vec<LexicalCandidate>> {
        let fts_query = match fts_match_query(tokens) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT d.id, d.search_text \
                 FROM doc_embeddings_fts \
                 JOIN doc_embeddings d ON d.rowid = doc_embeddings_fts.rowid \
                 WHERE doc_embeddings_fts MATCH ?1 \
                   AND (?2 IS NULL OR d.doc_type = ?2) \
                 ORDER BY d.id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![fts_query, doc_type.map(|t| t.as_str())], |row| {
                Ok(LexicalCandidate {
                    id: row.get(0)?,
                    search_text: row.get(1)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ---------------------------------------------------------------
    // Vector candidates
    // ---------------------------------------------------------------

    /// Load and normalize all embeddings into a matrix for fast cosine scoring.
    fn load_embedding_matrix(&self) -> Result<()> {
        let mut ids = Vec::new();
        let mut types = Vec::new();
        let mut vectors: Vec<Vec<f32>> = Vec::new();

        let generation = {
            let conn = self.conn.lock();
            // Read under the same lock as the rows so the pair is consistent.
            let generation = self.write_generation.load(Ordering::SeqCst);
            let mut stmt = conn
                .prepare("SELECT id, doc_type, embedding FROM doc_embeddings ORDER BY id")
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })
                .map_err(|e| Error::Database(e.to_string()))?;

            for row in rows {
                let (id, doc_type, blob) = row.map_err(|e| Error::Database(e.to_string()))?;
                let vector = blob_to_vec(&blob);
                if vector.len() != self.embedding_dim {
                    warn!(
                        "Skipping {}: stored dimension {} != {}",
                        id,
                        vector.len(),
                        self.embedding_dim
                    );
                    continue;
                }
                let doc_type = match doc_type.parse::<DocType>() {
                    Ok(t) => t,
                    Err(_) => {
                        warn!("Skipping {}: unknown doc_type {}", id, doc_type);
                        continue;
                    }
                };
                ids.push(id);
                types.push(doc_type);
                vectors.push(vector);
            }
            generation
        };

        let mut matrix = Array2::zeros((vectors.len(), self.embedding_dim));
        for (i, v) in vectors.iter().enumerate() {
            if let Some(n) = normalized(v) {
                matrix.row_mut(i).assign(&n);
            }
        }

        let mut mat = self.embedding_matrix.lock();
        // A concurrent loader may already have installed a newer snapshot.
        if mat.generation.map_or(false, |g| g > generation) {
            return Ok(());
        }
        mat.matrix = matrix;
        mat.ids = ids;
        mat.types = types;
        mat.generation = Some(generation);
        debug!(
            "Loaded {} embeddings into matrix (generation {})",
            mat.ids.len(),
            generation
        );
        Ok(())
    }

    fn ensure_matrix_loaded(&self) -> Result<()> {
        let current = self.write_generation.load(Ordering::SeqCst);
        if !self.embedding_matrix.lock().is_current(current) {
            self.load_embedding_matrix()?;
        }
        Ok(())
    }

    /// Cosine similarity of every stored embedding (optionally one type) against `query`.
    pub fn vector_candidates(
        &self,
        query: &[f32],
        doc_type: Option<DocType>,
    ) -> Result<Vec<VectorCandidate>> {
        if query.len() != self.embedding_dim {
            return Err(Error::Validation(format!(
                "query vector has dimension {}, store expects {}",
                query.len(),
                self.embedding_dim
            )));
        }
        let q = match normalized(query) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        self.ensure_matrix_loaded()?;
        let mat = self.embedding_matrix.lock();
        if mat.ids.is_empty() {
            return Ok(Vec::new());
        }

        let similarities = mat.matrix.dot(&q);
        Ok(similarities
            .iter()
            .enumerate()
            .filter(|(i, _)| doc_type.map_or(true, |t| mat.types[*i] == t))
            .map(|(i, &s)| VectorCandidate {
                id: mat.ids[i].clone(),
                doc_type: mat.types[i],
                similarity: s as f64,
            })
            .collect())
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let total_documents: i64 = conn
            .query_row("SELECT COUNT(*) FROM doc_embeddings", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        let last_update: Option<i64> = conn
            .query_row("SELECT MAX(updated_at) FROM doc_embeddings", [], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut by_type = BTreeMap::new();
        {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT doc_type, COUNT(*) FROM doc_embeddings GROUP BY doc_type",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(|e| Error::Database(e.to_string()))?;
            for row in rows {
                let (t, n) = row.map_err(|e| Error::Database(e.to_string()))?;
                by_type.insert(t, n);
            }
        }
        drop(conn);

        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let matrix_rows = self.embedding_matrix.lock().ids.len();

        Ok(StoreStats {
            total_documents,
            by_type,
            last_update,
            embedding_dimension: self.embedding_dim,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
            matrix_rows,
        })
    }

    // ---------------------------------------------------------------
    // Row Mapping
    // ---------------------------------------------------------------

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
        let doc_type_raw: String = row.get("doc_type")?;
        let doc_type = doc_type_raw
            .parse::<DocType>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
        let metadata = row
            .get::<_, Option<String>>("metadata_json")?
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        let blob: Vec<u8> = row.get("embedding")?;

        Ok(EmbeddingRecord {
            id: row.get("id")?,
            doc_type,
            title: row.get("title")?,
            content: row.get("content")?,
            url: row.get("url")?,
            embedding: blob_to_vec(&blob),
            search_text: row.get("search_text")?,
            metadata,
            content_hash: row.get("content_hash")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
