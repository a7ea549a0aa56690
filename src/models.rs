/// Canonical email row. Dedup identity is the full five-field tuple, never the
/// provider's own message id.
///
/// Mail pulled from the provider always carries a timestamp and an attachment list;
/// demo imports leave sender, subject, timestamp and attachment types as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    /// Raw `From` header value; `None` is stored as SQL NULL.
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    /// Delivery time in epoch milliseconds, taken verbatim from the provider.
    pub timestamp: Option<i64>,
    /// Comma-joined extension tokens in part order, `""` when there are none.
    pub attachment_types: Option<String>,
}

impl EmailRecord {
    /// A record carrying only a body, as produced by demo imports.
    pub fn body_only(body: String) -> Self {
        Self {
            sender: None,
            subject: None,
            body,
            timestamp: None,
            attachment_types: None,
        }
    }
}

/// A record read back from the store together with its surrogate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEmail {
    pub id: i64,
    pub record: EmailRecord,
}
