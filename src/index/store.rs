//! `DocIndex` — SQLite chunk index for retrieval.
//!
//! One database file (`chunks.db`) holds three tables:
//! - `doc_metadata` — one row per document, content included.
//! - `chunks` — FTS5 virtual table; `text` is searchable, the rest is stored
//!   `UNINDEXED`.
//! - `embeddings` — one little-endian `f32` vector per chunk when an
//!   embedding service is configured.
//!
//! Connections are opened per operation, so the handle is a pair of paths and
//! is cheap to clone into `spawn_blocking` closures.
//!
//! Engines index into generations: `<index_dir>/<uuid v7>/chunks.db`, one per
//! build. A generation directory is deleted when the last handle to it drops,
//! so a rebuild never touches the index an older engine is still serving.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use text_splitter::{MarkdownSplitter, TextSplitter};
use tracing::{debug, info, warn};

use super::embed::Embedder;
use super::vector;
use crate::config::RetrievalConfig;
use crate::documents::Document;
use crate::error::AppError;

const DB_FILENAME: &str = "chunks.db";
const SCHEMA_VERSION: i64 = 1;

/// Chunking parameters in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl From<&RetrievalConfig> for ChunkConfig {
    fn from(cfg: &RetrievalConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size,
            chunk_overlap: cfg.chunk_overlap,
        }
    }
}

/// Lightweight document descriptor (no content).
#[derive(Debug, Clone, Serialize)]
pub struct DocMetadata {
    pub doc_id: String,
    pub title: String,
    pub source: String,
    pub content_hash: String,
    pub created_at: String,
    pub metadata: HashMap<String, String>,
}

/// A slice of a document; `position` is its byte offset in the source.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    pub position: usize,
}

/// A search hit with its parent document's title and source.
/// `score` is cosine similarity, or negated BM25 rank; higher is better.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    pub title: String,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
}

#[derive(Debug, Clone)]
pub struct DocIndex {
    dir: PathBuf,
    db_path: PathBuf,
    generation: Option<Arc<GenerationDir>>,
}

/// Owns a generation directory; removes it on drop.
#[derive(Debug)]
struct GenerationDir(PathBuf);

impl Drop for GenerationDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.0) {
            Ok(()) => debug!(dir = %self.0.display(), "index generation removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.0.display(), "failed to remove index generation: {e}"),
        }
    }
}

impl DocIndex {
    /// Open (creating if needed) the index database under `dir`.
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::Index(format!("cannot create {}: {e}", dir.display())))?;
        let index = Self {
            dir: dir.to_path_buf(),
            db_path: dir.join(DB_FILENAME),
            generation: None,
        };
        index.init_db()?;
        Ok(index)
    }

    /// Open an empty index in a fresh generation directory under `root`.
    /// The directory lives as long as any clone of the returned handle.
    pub fn create_generation(root: &Path) -> Result<Self, AppError> {
        let dir = root.join(uuid::Uuid::now_v7().to_string());
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Index(format!("cannot create {}: {e}", dir.display())))?;
        let index = Self {
            db_path: dir.join(DB_FILENAME),
            generation: Some(Arc::new(GenerationDir(dir.clone()))),
            dir,
        };
        index.init_db()?;
        debug!(dir = %index.dir.display(), "index generation created");
        Ok(index)
    }

    /// Delete generation directories left under `root` by an earlier process.
    /// Call before the first engine is built; returns how many were removed.
    pub fn remove_stale_generations(root: &Path) -> Result<usize, AppError> {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Index(format!("cannot read {}: {e}", root.display()))),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            let is_generation = path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| uuid::Uuid::parse_str(n).is_ok());
            if is_generation {
                fs::remove_dir_all(&path)
                    .map_err(|e| AppError::Index(format!("cannot remove {}: {e}", path.display())))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, root = %root.display(), "stale index generations removed");
        }
        Ok(removed)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert `doc` unless a document with identical content exists; either
    /// way return the stored id.
    pub fn add_document(&self, doc: &Document) -> Result<String, AppError> {
        let content_hash = sha256_hex(&doc.content);
        let conn = self.open_conn()?;
        if let Some(existing_id) = find_doc_id_by_hash(&conn, &content_hash)? {
            debug!(doc_id = %existing_id, source = %doc.source, "duplicate content, reusing document");
            return Ok(existing_id);
        }

        let doc_id = if doc.id.is_empty() {
            uuid::Uuid::now_v7().to_string()
        } else {
            doc.id.clone()
        };
        let metadata_json = serde_json::to_string(&doc.metadata)
            .map_err(|e| AppError::Index(format!("serialize metadata: {e}")))?;

        conn.execute(
            "INSERT INTO doc_metadata (doc_id, title, source, content, content_hash, created_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                doc_id,
                doc.title,
                doc.source,
                doc.content,
                content_hash,
                now_iso8601(),
                metadata_json
            ],
        )
        .map_err(|e| AppError::Index(format!("insert document {}: {e}", doc.source)))?;

        Ok(doc_id)
    }

    /// Split a stored document. Markdown sources use the Markdown-aware
    /// splitter; everything else splits on text boundaries.
    /// Returns the chunks but does not index them — call `index_chunks` next.
    pub fn chunk_document(&self, doc_id: &str, cfg: &ChunkConfig) -> Result<Vec<Chunk>, AppError> {
        if cfg.chunk_size == 0 {
            return Err(AppError::Index("chunk_size must be > 0".to_string()));
        }
        let splitter_cfg = text_splitter::ChunkConfig::new(cfg.chunk_size)
            .with_overlap(cfg.chunk_overlap)
            .map_err(|e| AppError::Index(format!("invalid chunk config: {e}")))?;

        let conn = self.open_conn()?;
        let (source, content): (String, String) = conn
            .query_row(
                "SELECT source, content FROM doc_metadata WHERE doc_id = ?1",
                params![doc_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| AppError::Index(format!("load document {doc_id}: {e}")))?;

        let pieces: Vec<(usize, &str)> = if is_markdown(&source) {
            MarkdownSplitter::new(splitter_cfg).chunk_indices(&content).collect()
        } else {
            TextSplitter::new(splitter_cfg).chunk_indices(&content).collect()
        };

        Ok(pieces
            .into_iter()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(pos, text)| Chunk {
                id: uuid::Uuid::now_v7().to_string(),
                doc_id: doc_id.to_string(),
                text: text.to_string(),
                position: pos,
            })
            .collect())
    }

    /// Write `chunks` (and their vectors, when given) into the index,
    /// replacing any chunks previously indexed for the same documents.
    /// `embeddings` is either empty or parallel to `chunks`.
    pub fn index_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }
        if !embeddings.is_empty() && embeddings.len() != chunks.len() {
            return Err(AppError::Index(format!(
                "{} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("begin index tx: {e}")))?;

        let mut doc_ids: Vec<&str> = chunks.iter().map(|c| c.doc_id.as_str()).collect();
        doc_ids.sort_unstable();
        doc_ids.dedup();
        for doc_id in doc_ids {
            tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])
                .map_err(|e| AppError::Index(format!("clear chunks for {doc_id}: {e}")))?;
            tx.execute("DELETE FROM embeddings WHERE doc_id = ?1", params![doc_id])
                .map_err(|e| AppError::Index(format!("clear embeddings for {doc_id}: {e}")))?;
        }

        for (i, chunk) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (id, doc_id, text, position) VALUES (?1, ?2, ?3, ?4)",
                params![chunk.id, chunk.doc_id, chunk.text, chunk.position as i64],
            )
            .map_err(|e| AppError::Index(format!("insert chunk: {e}")))?;

            if let Some(v) = embeddings.get(i) {
                tx.execute(
                    "INSERT INTO embeddings (chunk_id, doc_id, dim, vector) VALUES (?1, ?2, ?3, ?4)",
                    params![chunk.id, chunk.doc_id, v.len() as i64, vector::to_blob(v)],
                )
                .map_err(|e| AppError::Index(format!("insert embedding: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("commit index tx: {e}")))?;
        Ok(())
    }

    /// Clear, then store, chunk and embed every document in `docs`.
    pub async fn rebuild(
        &self,
        docs: Vec<Document>,
        embedder: &Embedder,
        cfg: &ChunkConfig,
    ) -> Result<IndexStats, AppError> {
        let index = self.clone();
        let cfg = *cfg;
        let chunks = tokio::task::spawn_blocking(move || index.stage_documents(docs, &cfg))
            .await
            .map_err(|e| AppError::Index(format!("rebuild task failed: {e}")))??;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;

        let index = self.clone();
        let stats = tokio::task::spawn_blocking(move || {
            index.index_chunks(&chunks, &embeddings)?;
            index.stats()
        })
        .await
        .map_err(|e| AppError::Index(format!("rebuild task failed: {e}")))??;

        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            embedded = stats.embedded_chunks,
            embedder = %embedder.describe(),
            "index rebuilt"
        );
        Ok(stats)
    }

    fn stage_documents(&self, docs: Vec<Document>, cfg: &ChunkConfig) -> Result<Vec<Chunk>, AppError> {
        self.clear()?;
        let mut chunks = Vec::new();
        let mut seen = Vec::new();
        for doc in &docs {
            let doc_id = self.add_document(doc)?;
            if seen.contains(&doc_id) {
                continue;
            }
            chunks.extend(self.chunk_document(&doc_id, cfg)?);
            seen.push(doc_id);
        }
        Ok(chunks)
    }

    /// Top-`top_k` chunks for `query`.
    ///
    /// With a query embedding and stored vectors, chunks are ranked by cosine
    /// similarity. Otherwise the query's words are OR-ed into an FTS5 match
    /// and ranked by BM25.
    pub fn search(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AppError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.open_conn()?;
        if let Some(qv) = query_embedding {
            if count(&conn, "SELECT COUNT(*) FROM embeddings")? > 0 {
                return search_vectors(&conn, qv, top_k);
            }
        }
        search_bm25(&conn, query, top_k)
    }

    /// Remove every document, chunk and embedding.
    pub fn clear(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            "DELETE FROM embeddings;
             DELETE FROM chunks;
             DELETE FROM doc_metadata;",
        )
        .map_err(|e| AppError::Index(format!("clear index: {e}")))
    }

    pub fn stats(&self) -> Result<IndexStats, AppError> {
        let conn = self.open_conn()?;
        Ok(IndexStats {
            documents: count(&conn, "SELECT COUNT(*) FROM doc_metadata")?,
            chunks: count(&conn, "SELECT COUNT(*) FROM chunks")?,
            embedded_chunks: count(&conn, "SELECT COUNT(*) FROM embeddings")?,
        })
    }

    pub fn list_documents(&self) -> Result<Vec<DocMetadata>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT doc_id, title, source, content_hash, created_at, metadata
                 FROM doc_metadata ORDER BY source",
            )
            .map_err(|e| AppError::Index(format!("prepare list_documents: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let metadata_json: String = row.get(5)?;
                Ok(DocMetadata {
                    doc_id: row.get(0)?,
                    title: row.get(1)?,
                    source: row.get(2)?,
                    content_hash: row.get(3)?,
                    created_at: row.get(4)?,
                    metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                })
            })
            .map_err(|e| AppError::Index(format!("query list_documents: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Index(format!("map list_documents row: {e}")))
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Index(format!("read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS doc_metadata (
                    doc_id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    source TEXT NOT NULL,
                    content TEXT NOT NULL,
                    content_hash TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL,
                    metadata TEXT NOT NULL
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS chunks USING fts5(
                    id UNINDEXED,
                    doc_id UNINDEXED,
                    text,
                    position UNINDEXED
                );

                CREATE TABLE IF NOT EXISTS embeddings (
                    chunk_id TEXT PRIMARY KEY,
                    doc_id TEXT NOT NULL,
                    dim INTEGER NOT NULL,
                    vector BLOB NOT NULL
                );

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| AppError::Index(format!("initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Index(format!(
                "unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| AppError::Index(format!("open {}: {e}", self.db_path.display())))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Index(format!("set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Index(format!("set busy_timeout: {e}")))?;

        Ok(conn)
    }
}

fn search_vectors(conn: &Connection, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT e.chunk_id, e.doc_id, e.vector, c.text, d.title, d.source
             FROM embeddings e
             JOIN chunks c ON c.id = e.chunk_id
             JOIN doc_metadata d ON d.doc_id = e.doc_id",
        )
        .map_err(|e| AppError::Index(format!("prepare vector search: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                RetrievedChunk {
                    chunk_id: row.get(0)?,
                    doc_id: row.get(1)?,
                    text: row.get(3)?,
                    title: row.get(4)?,
                    source: row.get(5)?,
                    score: 0.0,
                },
                row.get::<_, Vec<u8>>(2)?,
            ))
        })
        .map_err(|e| AppError::Index(format!("execute vector search: {e}")))?;

    let mut hits = Vec::new();
    let mut vectors = Vec::new();
    for row in rows {
        let (hit, blob) = row.map_err(|e| AppError::Index(format!("map vector row: {e}")))?;
        let v = vector::from_blob(&blob)?;
        if v.len() != query.len() {
            warn!(chunk_id = %hit.chunk_id, dim = v.len(), expected = query.len(), "skipping embedding of different dimension");
            continue;
        }
        hits.push(hit);
        vectors.push(v);
    }

    let ranked = vector::rank_descending(query, &vectors)?;
    Ok(ranked
        .into_iter()
        .take(top_k)
        .map(|(i, score)| RetrievedChunk { score, ..hits[i].clone() })
        .collect())
}

fn search_bm25(conn: &Connection, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, AppError> {
    let Some(match_expr) = fts_query(query) else {
        return Ok(Vec::new());
    };

    let mut stmt = conn
        .prepare(
            "SELECT chunks.id, chunks.doc_id, chunks.text, bm25(chunks) AS rank,
                    doc_metadata.title, doc_metadata.source
             FROM chunks
             JOIN doc_metadata ON doc_metadata.doc_id = chunks.doc_id
             WHERE chunks MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )
        .map_err(|e| AppError::Index(format!("prepare bm25 search: {e}")))?;

    let rows = stmt
        .query_map(params![match_expr, top_k as i64], |row| {
            let bm25_score: f64 = row.get(3)?;
            Ok(RetrievedChunk {
                chunk_id: row.get(0)?,
                doc_id: row.get(1)?,
                text: row.get(2)?,
                title: row.get(4)?,
                source: row.get(5)?,
                score: (-bm25_score) as f32,
            })
        })
        .map_err(|e| AppError::Index(format!("execute bm25 search: {e}")))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Index(format!("map search row: {e}")))
}

/// FTS5 match expression: every alphanumeric word quoted, joined with `OR`.
/// Quoting neutralises FTS5 operators in user text.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

fn is_markdown(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

fn count(conn: &Connection, sql: &str) -> Result<usize, AppError> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|n| n as usize)
        .map_err(|e| AppError::Index(format!("count query failed: {e}")))
}

fn find_doc_id_by_hash(conn: &Connection, content_hash: &str) -> Result<Option<String>, AppError> {
    let mut stmt = conn
        .prepare("SELECT doc_id FROM doc_metadata WHERE content_hash = ?1")
        .map_err(|e| AppError::Index(format!("prepare find by hash: {e}")))?;
    let mut rows = stmt
        .query(params![content_hash])
        .map_err(|e| AppError::Index(format!("query find by hash: {e}")))?;
    match rows
        .next()
        .map_err(|e| AppError::Index(format!("read find by hash row: {e}")))?
    {
        Some(row) => Ok(Some(
            row.get(0)
                .map_err(|e| AppError::Index(format!("decode find by hash row: {e}")))?,
        )),
        None => Ok(None),
    }
}

/// Lowercase hex SHA-256 of `content`; the deduplication key.
fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
