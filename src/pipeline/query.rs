use std::path::Path;

use crate::config;
use crate::embeddings::Embedder;
use crate::error::{PipelineError, Result};
use crate::store::vectors::{QueryResult, VectorIndex};

/// Semantic search over the `emails` collection.
///
/// The index file and its collection must already exist; both are checked before
/// `load_embedder` runs, so a missing index never pays for a model load and never
/// gets tables created in it.
pub fn run_query<E, F>(
    index_path: &Path,
    query: &str,
    num_results: usize,
    load_embedder: F,
) -> Result<QueryResult>
where
    E: Embedder,
    F: FnOnce() -> anyhow::Result<E>,
{
    let mut index = VectorIndex::open_existing(index_path)?;
    if !index.has_collection(config::vectors::COLLECTION_NAME)? {
        log::warn!(
            "{} has no '{}' collection; run embed first",
            index_path.display(),
            config::vectors::COLLECTION_NAME
        );
        return Err(PipelineError::IndexNotFound(index_path.to_path_buf()));
    }

    let embedder = load_embedder()
        .map_err(|e| PipelineError::Collaborator(format!("failed to load embedder: {e:#}")))?;
    let collection = index.collection(config::vectors::COLLECTION_NAME, &embedder)?;

    log::info!("Querying {} documents for top {} matches", collection.count()?, num_results);
    collection.query(&[query.to_string()], num_results)
}
