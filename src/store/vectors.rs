// vectors.rs — On-disk vector index backed by sqlite-vec.
//
// Layout per collection `<name>`:
// - collections(name, model_name, dims): one row per collection
// - <name>_docs(rowid, doc_id UNIQUE, document, metadata JSON)
// - <name>_vec: vec0 virtual table, rowid shared with <name>_docs
//
// Distances are sqlite-vec's default L2; smaller is closer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use zerocopy::IntoBytes;

use crate::config;
use crate::embeddings::Embedder;
use crate::error::{PipelineError, Result};

pub type Metadata = BTreeMap<String, String>;

/// Ranked hits, one inner sequence per query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub distances: Vec<Vec<f64>>,
    pub metadatas: Vec<Vec<Metadata>>,
    pub documents: Vec<Vec<String>>,
}

static REGISTER_SQLITE_VEC: Once = Once::new();

/// Register sqlite-vec as an auto-extension before any vector connection opens.
/// This makes vec0 virtual tables available in all later connections.
fn register_sqlite_vec() {
    REGISTER_SQLITE_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

pub struct VectorIndex {
    path: PathBuf,
    conn: Connection,
}

impl VectorIndex {
    /// Open the index file, creating it if needed.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Configuration(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let index = Self::connect(path)?;
        index.conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        index.ensure_registry()?;
        Ok(index)
    }

    /// Open an index that must already exist on disk. Nothing is created in the file.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::IndexNotFound(path.to_path_buf()));
        }
        Self::connect(path)
    }

    fn connect(path: &Path) -> Result<Self> {
        register_sqlite_vec();
        log::info!("Opening vector index at {}", path.display());
        let conn = Connection::open(path)?;
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .map_err(|e| PipelineError::Collaborator(format!("sqlite-vec is not available: {e}")))?;
        log::debug!("sqlite-vec {}", version);
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    fn ensure_registry(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                model_name TEXT NOT NULL,
                dims INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Whether `name` has been created in this file. Read-only.
    pub fn has_collection(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        let has_registry: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'collections')",
            [],
            |r| r.get(0),
        )?;
        if !has_registry {
            return Ok(false);
        }
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
            params![name],
            |r| r.get(0),
        )?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get or create `name` for the given embedder. An existing collection built with a
    /// different vector size cannot be reused.
    pub fn collection<'a>(
        &'a mut self,
        name: &str,
        embedder: &'a dyn Embedder,
    ) -> Result<Collection<'a>> {
        validate_collection_name(name)?;
        self.ensure_registry()?;
        let existing: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT model_name, dims FROM collections WHERE name = ?1",
                params![name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((model_name, dims)) => {
                if dims as usize != embedder.dims() {
                    return Err(PipelineError::Collaborator(format!(
                        "collection '{name}' holds {dims}-dim vectors from {model_name}, but {} produces {}",
                        embedder.model_name(),
                        embedder.dims()
                    )));
                }
                if model_name != embedder.model_name() {
                    log::warn!(
                        "Collection '{}' was built with {}, using {} for this call",
                        name,
                        model_name,
                        embedder.model_name()
                    );
                }
            }
            None => {
                log::info!(
                    "Creating collection '{}' ({}, {} dims)",
                    name,
                    embedder.model_name(),
                    embedder.dims()
                );
                self.conn.execute_batch(&format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS {name}_docs (
                        rowid INTEGER PRIMARY KEY,
                        doc_id TEXT NOT NULL UNIQUE,
                        document TEXT NOT NULL,
                        metadata TEXT NOT NULL
                    );
                    CREATE VIRTUAL TABLE IF NOT EXISTS {name}_vec USING vec0(
                        embedding float[{dims}]
                    );
                    "#,
                    dims = embedder.dims()
                ))?;
                self.conn.execute(
                    "INSERT INTO collections (name, model_name, dims) VALUES (?1, ?2, ?3)",
                    params![name, embedder.model_name(), embedder.dims() as i64],
                )?;
            }
        }

        Ok(Collection {
            name: name.to_string(),
            conn: &mut self.conn,
            embedder,
        })
    }
}

/// A named collection bound to the embedder that fills and queries it.
pub struct Collection<'a> {
    name: String,
    conn: &'a mut Connection,
    embedder: &'a dyn Embedder,
}

impl Collection<'_> {
    pub fn count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}_docs", self.name), [], |r| r.get(0))?)
    }

    /// Embed `documents` and insert or replace them keyed by `ids`, in one transaction.
    pub fn upsert(
        &mut self,
        documents: &[String],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<usize> {
        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(PipelineError::Collaborator(format!(
                "mismatched batch: {} documents, {} metadatas, {} ids",
                documents.len(),
                metadatas.len(),
                ids.len()
            )));
        }
        if documents.is_empty() {
            return Ok(0);
        }

        let vectors = self.embed(documents)?;

        let name = &self.name;
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = documents.iter().zip(metadatas).zip(ids.iter().zip(&vectors));
        for ((doc, meta), (id, vector)) in rows {
            let metadata_json = serde_json::to_string(meta).map_err(|e| {
                PipelineError::Collaborator(format!("cannot encode metadata for {id}: {e}"))
            })?;

            let existing: Option<i64> = tx
                .query_row(
                    &format!("SELECT rowid FROM {name}_docs WHERE doc_id = ?1"),
                    params![id],
                    |r| r.get(0),
                )
                .optional()?;

            let rowid = match existing {
                Some(rowid) => {
                    tx.execute(
                        &format!("UPDATE {name}_docs SET document = ?1, metadata = ?2 WHERE rowid = ?3"),
                        params![doc, metadata_json, rowid],
                    )?;
                    tx.execute(
                        &format!("DELETE FROM {name}_vec WHERE rowid = ?1"),
                        params![rowid],
                    )?;
                    rowid
                }
                None => {
                    tx.execute(
                        &format!("INSERT INTO {name}_docs (doc_id, document, metadata) VALUES (?1, ?2, ?3)"),
                        params![id, doc, metadata_json],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            tx.execute(
                &format!("INSERT INTO {name}_vec (rowid, embedding) VALUES (?1, ?2)"),
                params![rowid, vector.as_slice().as_bytes()],
            )?;
        }
        tx.commit()?;
        Ok(documents.len())
    }

    /// k-nearest-neighbour search for each query text.
    ///
    /// Asking for more results than the collection holds returns what it has; vec0 caps
    /// `k` at [`config::vectors::MAX_KNN_K`].
    pub fn query(&self, query_texts: &[String], n_results: usize) -> Result<QueryResult> {
        let mut result = QueryResult::default();
        if query_texts.is_empty() {
            return Ok(result);
        }
        let vectors = self.embed(query_texts)?;

        let available = usize::try_from(self.count()?).unwrap_or(0);
        let k = n_results.min(available).min(config::vectors::MAX_KNN_K);
        if k < n_results {
            log::debug!(
                "Requested {} results, searching k={} ({} documents)",
                n_results,
                k,
                available
            );
        }

        for vector in &vectors {
            let mut ids = Vec::new();
            let mut distances = Vec::new();
            let mut metadatas = Vec::new();
            let mut documents = Vec::new();

            if k > 0 {
                let rows = knn_rows(&*self.conn, &self.name, vector, k).map_err(|e| {
                    PipelineError::Collaborator(format!("vector search failed: {e}"))
                })?;
                for (id, distance, metadata_json, document) in rows {
                    let metadata: Metadata = serde_json::from_str(&metadata_json).map_err(|e| {
                        PipelineError::Collaborator(format!("corrupt metadata: {e}"))
                    })?;
                    ids.push(id);
                    distances.push(distance);
                    metadatas.push(metadata);
                    documents.push(document);
                }
            }

            result.ids.push(ids);
            result.distances.push(distances);
            result.metadatas.push(metadatas);
            result.documents.push(documents);
        }
        Ok(result)
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .embedder
            .embed_batch(texts)
            .map_err(|e| PipelineError::Collaborator(format!("embedding failed: {e:#}")))?;
        if vectors.len() != texts.len() || vectors.iter().any(|v| v.len() != self.embedder.dims()) {
            return Err(PipelineError::Collaborator(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

type KnnRow = (String, f64, String, String);

fn knn_rows(
    conn: &Connection,
    name: &str,
    vector: &[f32],
    k: usize,
) -> rusqlite::Result<Vec<KnnRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        r#"
        SELECT d.doc_id, v.distance, d.metadata, d.document
        FROM (
            SELECT rowid, distance FROM {name}_vec
            WHERE embedding MATCH ?1 AND k = ?2
        ) v
        JOIN {name}_docs d ON d.rowid = v.rowid
        ORDER BY v.distance ASC
        "#
    ))?;
    let rows = stmt.query_map(params![vector.as_bytes(), k as i64], |r| {
        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
    })?;
    rows.collect()
}

fn validate_collection_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!("invalid collection name '{name}'")))
    }
}
