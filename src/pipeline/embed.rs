use crate::config;
use crate::embeddings::Embedder;
use crate::error::{PipelineError, Result};
use crate::models::StoredEmail;
use crate::store::emails::EmailStore;
use crate::store::vectors::{Metadata, VectorIndex};

/// Push every stored email into the `emails` collection, `batch_size` rows per upsert.
///
/// Batches already upserted stay in the index when a later batch fails.
pub fn embed_emails(
    store: &EmailStore,
    index: &mut VectorIndex,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<usize> {
    if batch_size == 0 {
        return Err(PipelineError::Configuration("batch size must be at least 1".into()));
    }

    let emails = store.all_emails()?;
    log::info!(
        "Embedding {} emails from {} in batches of {}",
        emails.len(),
        store.path().display(),
        batch_size
    );

    let mut collection = index.collection(config::vectors::COLLECTION_NAME, embedder)?;
    let total_batches = emails.len().div_ceil(batch_size);
    let mut embedded = 0;

    for (n, chunk) in emails.chunks(batch_size).enumerate() {
        let documents: Vec<String> = chunk.iter().map(|e| e.record.body.clone()).collect();
        let metadatas: Vec<Metadata> = chunk.iter().map(email_metadata).collect();
        let ids: Vec<String> = chunk.iter().map(|e| e.id.to_string()).collect();

        embedded += collection.upsert(&documents, &metadatas, &ids)?;
        log::info!("Batch {}/{} embedded ({} emails so far)", n + 1, total_batches, embedded);
    }

    log::info!(
        "Collection '{}' now holds {} documents",
        config::vectors::COLLECTION_NAME,
        collection.count()?
    );
    Ok(embedded)
}

fn email_metadata(email: &StoredEmail) -> Metadata {
    let record = &email.record;
    if record.sender.is_none() {
        log::warn!("Email {} has no sender", email.id);
    }
    if record.timestamp.is_none() {
        log::warn!("Email {} has no timestamp", email.id);
    }
    Metadata::from([
        ("sender".to_string(), record.sender.clone().unwrap_or_default()),
        ("subject".to_string(), record.subject.clone().unwrap_or_default()),
        (
            "timestamp".to_string(),
            record.timestamp.map(|t| t.to_string()).unwrap_or_default(),
        ),
        (
            "attachment_types".to_string(),
            record.attachment_types.clone().unwrap_or_default(),
        ),
    ])
}
