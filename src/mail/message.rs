// message.rs — Gmail API message payload (format=full) as served by users.messages.get.
//
// Only the fields the normalizer reads are modelled; everything else is ignored by serde.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMessage {
    pub id: String,
    /// Delivery time as a decimal string of epoch milliseconds.
    pub internal_date: String,
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One node of the MIME tree. The top-level payload uses the same shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    /// base64url-encoded content; absent for attachments fetched separately.
    #[serde(default)]
    pub data: Option<String>,
}

/// The two ways a payload can carry content, resolved once per message.
#[derive(Debug, Clone, Copy)]
pub enum PayloadShape<'a> {
    MultiPart(&'a [MessagePart]),
    SinglePart(Option<&'a PartBody>),
}

impl MessagePart {
    /// A `parts` array, when present, takes precedence over an inline body.
    pub fn shape(&self) -> PayloadShape<'_> {
        match &self.parts {
            Some(parts) => PayloadShape::MultiPart(parts),
            None => PayloadShape::SinglePart(self.body.as_ref()),
        }
    }

    pub fn is_mime(&self, mime: &str) -> bool {
        self.mime_type.as_deref() == Some(mime)
    }
}
