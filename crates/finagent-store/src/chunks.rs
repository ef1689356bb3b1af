//! Local full-text chunk index used as the document retrieval backend

use crate::{MetadataFilter, StoreError};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A stored chunk matched by a search, nearest first
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub id: i64,
    pub text: String,
    pub metadata: MetadataFilter,
    /// In (0, 1]; smaller is closer
    pub distance: f64,
}

pub struct ChunkIndex {
    conn: Mutex<Connection>,
}

impl ChunkIndex {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                text,
                content=chunks,
                content_rowid=id
            );
            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
            END;
            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.id, old.text);
            END;
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_chunk(&self, text: &str, metadata: &MetadataFilter) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO chunks (text, metadata) VALUES (?1, ?2)",
            params![text, serde_json::to_string(metadata)?],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert many chunks sharing one metadata map in a single transaction
    pub fn add_chunks<'a>(
        &self,
        texts: impl IntoIterator<Item = &'a str>,
        metadata: &MetadataFilter,
    ) -> Result<usize, StoreError> {
        let meta_json = serde_json::to_string(metadata)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare("INSERT INTO chunks (text, metadata) VALUES (?1, ?2)")?;
            for text in texts {
                stmt.execute(params![text, meta_json])?;
                added += 1;
            }
        }
        tx.commit()?;
        tracing::info!(added, "chunks indexed");
        Ok(added)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    pub fn clear(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        Ok(conn.execute("DELETE FROM chunks", [])?)
    }

    /// Up to `n` chunks matching any query term, best BM25 rank first.
    /// Chunks whose metadata does not contain every filter pair are skipped.
    pub fn search(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        n: usize,
    ) -> Result<Vec<ChunkHit>, StoreError> {
        let Some(fts_query) = match_expression(query) else {
            return Ok(Vec::new());
        };
        if n == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.text, c.metadata, chunks_fts.rank FROM chunks_fts
             JOIN chunks c ON c.id = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1
             ORDER BY chunks_fts.rank",
        )?;
        let rows = stmt.query_map(params![fts_query], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, text, metadata, rank) = row?;
            let metadata: MetadataFilter = match serde_json::from_str(&metadata) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(id, "skipping chunk with unreadable metadata: {e}");
                    continue;
                }
            };

            if let Some(f) = filter {
                if !f.iter().all(|(k, v)| metadata.get(k) == Some(v)) {
                    continue;
                }
            }

            hits.push(ChunkHit {
                id,
                text,
                metadata,
                distance: rank_to_distance(rank),
            });
            if hits.len() == n {
                break;
            }
        }

        tracing::debug!(query, hits = hits.len(), "chunk search");
        Ok(hits)
    }
}

/// Quote every alphanumeric term and OR them together
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

// bm25 ranks are negative, more negative is better
fn rank_to_distance(rank: f64) -> f64 {
    1.0 / (1.0 + rank.abs())
}
