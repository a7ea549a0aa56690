use crate::error::Result;
use crate::mail::gmail::MailProvider;
use crate::mail::normalize::normalize_message;
use crate::models::EmailRecord;
use crate::store::emails::EmailStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub fetched: usize,
    pub inserted: usize,
}

/// Pull up to `max_messages` messages and store the ones not seen before.
///
/// Everything is fetched and normalized first, then committed in one batch, so a
/// provider failure part-way through leaves the store untouched.
pub fn extract_emails(
    provider: &dyn MailProvider,
    store: &mut EmailStore,
    max_messages: u32,
) -> Result<ExtractSummary> {
    let ids = provider.list_message_ids(max_messages)?;
    log::info!("Provider listed {} messages (max {})", ids.len(), max_messages);

    let mut records: Vec<EmailRecord> = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let message = provider.get_message(id)?;
        records.push(normalize_message(&message)?);
        if (i + 1) % 100 == 0 {
            log::info!("Fetched {}/{} messages", i + 1, ids.len());
        }
    }

    let inserted = store.insert_batch_if_new(&records)?;
    Ok(ExtractSummary {
        fetched: records.len(),
        inserted,
    })
}
