//! Persistent vector store.
//!
//! A keyed map of chunk-id → vector record backed by a single SQLite
//! file (`db/vectors.db` under the project state directory). Vectors
//! are l2-normalized on ingestion, so cosine similarity reduces to a
//! dot product at query time. kNN is brute-force over all rows; the
//! store holds one project's chunks, a few thousand at most.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::warn;

use crate::core::types::Chunk;
use crate::error::StoreError;

/// A stored vector record.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Owning chunk id.
    pub chunk_id: String,
    /// Owning file path.
    pub path: String,
    /// The stored (normalized) vector.
    pub vector: Vec<f32>,
    /// Epoch milliseconds at insertion.
    pub created_at: u64,
}

/// Store statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Number of vector records.
    pub vector_count: usize,
    /// Number of distinct file paths.
    pub path_count: usize,
    /// Vector dimension (0 when empty).
    pub dim: usize,
}

/// SQLite-backed vector store. Single writer per project.
pub struct VectorStore {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// A corrupt backing file is moved aside and replaced with a fresh
    /// store, with a warning, never an error.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }

        let conn = match Connection::open(path) {
            Ok(conn) if Self::init_schema(&conn).is_ok() => conn,
            _ => {
                warn!(
                    "vector store at {} unreadable, starting fresh",
                    path.display()
                );
                let aside = path.with_extension("db.corrupt");
                let _ = std::fs::rename(path, &aside);
                let conn = Connection::open(path).map_err(|e| StoreError::Open {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                Self::init_schema(&conn)?;
                conn
            }
        };

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Opens an in-memory store (tests).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            message: e.to_string(),
        })?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vectors (
                 chunk_id   TEXT PRIMARY KEY,
                 path       TEXT NOT NULL,
                 dim        INTEGER NOT NULL,
                 vector     BLOB NOT NULL,
                 created_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_vectors_path ON vectors(path);",
        )?;
        Ok(())
    }

    /// Inserts or replaces vector records for the given chunks.
    ///
    /// `chunks` and `vectors` are paired by index; a length mismatch is
    /// an error. Vectors are l2-normalized before storage. Returns the
    /// number of records written.
    pub fn add_chunks(
        &mut self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        if chunks.len() != vectors.len() {
            return Err(StoreError::Query {
                message: format!(
                    "chunk/vector count mismatch: {} chunks, {} vectors",
                    chunks.len(),
                    vectors.len()
                ),
            });
        }

        let now = now_millis();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO vectors (chunk_id, path, dim, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (chunk, vector) in chunks.iter().zip(vectors) {
                let mut v = vector.clone();
                crate::embedding::normalize(&mut v);
                stmt.execute(params![
                    chunk.id,
                    chunk.path,
                    v.len() as i64,
                    vector_to_blob(&v),
                    now as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Fetches one record by chunk id.
    pub fn get(&self, chunk_id: &str) -> Result<Option<VectorRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_id, path, vector, created_at FROM vectors WHERE chunk_id = ?1",
        )?;
        let mut rows = stmt.query(params![chunk_id])?;
        match rows.next()? {
            Some(row) => {
                let blob: Vec<u8> = row.get(2)?;
                Ok(Some(VectorRecord {
                    chunk_id: row.get(0)?,
                    path: row.get(1)?,
                    vector: blob_to_vector(&blob),
                    created_at: row.get::<_, i64>(3)?.max(0) as u64,
                }))
            }
            None => Ok(None),
        }
    }

    /// Deletes every record belonging to `path`. Returns the count.
    pub fn delete_for_path(&mut self, path: &str) -> Result<usize, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM vectors WHERE path = ?1", params![path])?;
        Ok(n)
    }

    /// k-nearest-neighbor search by cosine similarity.
    ///
    /// The query vector is normalized here; stored vectors were
    /// normalized on ingestion, so similarity is a dot product. Records
    /// whose dimension differs from the query are skipped. An empty
    /// store (or an all-zero query) returns no results; ranking then
    /// degrades to lexical/structural signals.
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, StoreError> {
        if k == 0 || query.iter().all(|x| x.abs() < f32::EPSILON) {
            return Ok(Vec::new());
        }
        let mut q = query.to_vec();
        crate::embedding::normalize(&mut q);

        let mut stmt = self
            .conn
            .prepare("SELECT chunk_id, dim, vector FROM vectors")?;
        let mut rows = stmt.query([])?;

        let mut scored: Vec<(String, f32)> = Vec::new();
        while let Some(row) = rows.next()? {
            let dim: i64 = row.get(1)?;
            if dim as usize != q.len() {
                continue;
            }
            let chunk_id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(2)?;
            let v = blob_to_vector(&blob);
            let score: f32 = q.iter().zip(&v).map(|(a, b)| a * b).sum();
            scored.push((chunk_id, score));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Max cosine similarity per path, over every record of that path.
    ///
    /// Convenience for the ranker: one pass instead of per-file kNN.
    pub fn max_similarity_by_path(
        &self,
        query: &[f32],
    ) -> Result<std::collections::HashMap<String, f32>, StoreError> {
        if query.iter().all(|x| x.abs() < f32::EPSILON) {
            return Ok(std::collections::HashMap::new());
        }
        let mut q = query.to_vec();
        crate::embedding::normalize(&mut q);

        let mut stmt = self.conn.prepare("SELECT path, dim, vector FROM vectors")?;
        let mut rows = stmt.query([])?;

        let mut best: std::collections::HashMap<String, f32> = std::collections::HashMap::new();
        while let Some(row) = rows.next()? {
            let dim: i64 = row.get(1)?;
            if dim as usize != q.len() {
                continue;
            }
            let path: String = row.get(0)?;
            let blob: Vec<u8> = row.get(2)?;
            let v = blob_to_vector(&blob);
            let score: f32 = q.iter().zip(&v).map(|(a, b)| a * b).sum();
            let entry = best.entry(path).or_insert(f32::MIN);
            if score > *entry {
                *entry = score;
            }
        }
        Ok(best)
    }

    /// Store statistics.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let vector_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM vectors", [], |r| r.get(0))?;
        let path_count: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT path) FROM vectors", [], |r| r.get(0))?;
        let dim: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(dim), 0) FROM vectors", [], |r| r.get(0))?;
        Ok(StoreStats {
            vector_count: vector_count.max(0) as usize,
            path_count: path_count.max(0) as usize,
            dim: dim.max(0) as usize,
        })
    }
}

fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(v.len() * 4);
    for x in v {
        blob.extend_from_slice(&x.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
