// normalize.rs — Turns one provider message into a canonical `EmailRecord`.
//
// Pure functions only; no I/O. Decoding failures are malformed payloads and surface
// as provider errors so the extraction run aborts before commit.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::config::normalize::{MIME_TEXT_HTML, MIME_TEXT_PLAIN, NO_BODY_MARKER, UNKNOWN_EXTENSION};
use crate::error::{PipelineError, Result};
use crate::mail::message::{Header, MessagePart, PartBody, PayloadShape, ProviderMessage};
use crate::models::EmailRecord;

// Gmail emits base64url, sometimes padded and sometimes not.
const BASE64_URL_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Case-insensitive header lookup; the first match wins.
pub fn get_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Extract the message text.
///
/// Multi-part payloads are scanned twice: first for `text/plain`, then for `text/html`,
/// so a plain-text part always wins over HTML regardless of where it sits. A single-part
/// payload decodes its inline body. Falls back to the no-body marker.
pub fn extract_message_body(payload: &MessagePart) -> Result<String> {
    match payload.shape() {
        PayloadShape::MultiPart(parts) => {
            for mime in [MIME_TEXT_PLAIN, MIME_TEXT_HTML] {
                for part in parts.iter().filter(|p| p.is_mime(mime)) {
                    if let Some(text) = decode_body(part.body.as_ref())? {
                        return Ok(text);
                    }
                }
            }
        }
        PayloadShape::SinglePart(body) => {
            if let Some(text) = decode_body(body)? {
                return Ok(text);
            }
        }
    }
    Ok(NO_BODY_MARKER.to_string())
}

/// Comma-joined extensions of every part carrying a filename, in part order.
pub fn extract_attachment_types(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|p| p.filename.as_deref().filter(|f| !f.is_empty()))
        .map(|f| file_extension(f).unwrap_or(UNKNOWN_EXTENSION))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn normalize_message(message: &ProviderMessage) -> Result<EmailRecord> {
    let payload = &message.payload;
    let sender = get_header(&payload.headers, "From").map(str::to_string);
    let subject = get_header(&payload.headers, "Subject").map(str::to_string);
    let body = extract_message_body(payload)?;

    let attachment_types = match payload.shape() {
        PayloadShape::MultiPart(parts) => extract_attachment_types(parts),
        PayloadShape::SinglePart(_) => String::new(),
    };

    let timestamp = message.internal_date.trim().parse::<i64>().map_err(|e| {
        PipelineError::Provider(format!(
            "message {} has invalid internalDate '{}': {e}",
            message.id, message.internal_date
        ))
    })?;

    Ok(EmailRecord {
        sender,
        subject,
        body,
        timestamp: Some(timestamp),
        attachment_types: Some(attachment_types),
    })
}

fn decode_body(body: Option<&PartBody>) -> Result<Option<String>> {
    let Some(data) = body.and_then(|b| b.data.as_deref()) else {
        return Ok(None);
    };
    let bytes = BASE64_URL_LENIENT
        .decode(data.trim())
        .map_err(|e| PipelineError::Provider(format!("malformed base64 body: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| PipelineError::Provider(format!("body is not valid UTF-8: {e}")))?;
    Ok(Some(text))
}

/// Extension including the leading dot, following `os.path.splitext` rules:
/// only the basename counts and leading dots do not start an extension.
fn file_extension(filename: &str) -> Option<&str> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem_start = base.len() - base.trim_start_matches('.').len();
    let dot = base.rfind('.')?;
    if dot <= stem_start {
        return None;
    }
    Some(&base[dot..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn text_part(mime: &str, data: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(PartBody {
                data: Some(data.to_string()),
            }),
            ..Default::default()
        }
    }

    fn file_part(filename: &str) -> MessagePart {
        MessagePart {
            filename: Some(filename.to_string()),
            ..Default::default()
        }
    }

    fn encode(s: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(s)
    }

    #[test]
    fn test_get_header_case_insensitive() {
        let headers = vec![header("From", "a@x.com"), header("Subject", "Test Subject")];
        assert_eq!(get_header(&headers, "from"), Some("a@x.com"));
        assert_eq!(get_header(&headers, "SUBJECT"), Some("Test Subject"));
        assert_eq!(get_header(&headers, "NonExistent"), None);
    }

    #[test]
    fn test_get_header_first_match_wins() {
        let headers = vec![header("Received", "one"), header("received", "two")];
        assert_eq!(get_header(&headers, "Received"), Some("one"));
    }

    #[test]
    fn test_body_from_plain_part() {
        // "This is a test email", padded base64 as served in the wild.
        let payload = MessagePart {
            body: Some(PartBody {
                data: Some("VGhpcyBpcyBhIHRlc3QgZW1haWw=".to_string()),
            }),
            parts: Some(vec![text_part("text/plain", "VGhpcyBpcyBhIHRlc3QgZW1haWw=")]),
            ..Default::default()
        };
        assert_eq!(extract_message_body(&payload).unwrap(), "This is a test email");
    }

    #[test]
    fn test_body_plain_wins_over_earlier_html() {
        // Deliberate divergence: a single sweep would return the HTML part here.
        let payload = MessagePart {
            parts: Some(vec![
                text_part("text/html", &encode("<p>html</p>")),
                text_part("text/plain", &encode("plain")),
            ]),
            ..Default::default()
        };
        assert_eq!(extract_message_body(&payload).unwrap(), "plain");
    }

    #[test]
    fn test_body_html_when_no_plain() {
        let payload = MessagePart {
            parts: Some(vec![
                file_part("a.pdf"),
                text_part("text/html", &encode("<b>hi</b>")),
            ]),
            ..Default::default()
        };
        assert_eq!(extract_message_body(&payload).unwrap(), "<b>hi</b>");
    }

    #[test]
    fn test_body_skips_text_part_without_data() {
        let mut empty_plain = text_part("text/plain", "");
        empty_plain.body = Some(PartBody { data: None });
        let payload = MessagePart {
            parts: Some(vec![empty_plain, text_part("text/plain", &encode("second"))]),
            ..Default::default()
        };
        assert_eq!(extract_message_body(&payload).unwrap(), "second");
    }

    #[test]
    fn test_body_single_part_and_fallback() {
        let single = MessagePart {
            body: Some(PartBody {
                data: Some(encode("inline")),
            }),
            ..Default::default()
        };
        assert_eq!(extract_message_body(&single).unwrap(), "inline");

        let nothing = MessagePart::default();
        assert_eq!(extract_message_body(&nothing).unwrap(), "No body text found.");

        let only_attachments = MessagePart {
            parts: Some(vec![file_part("x.zip")]),
            ..Default::default()
        };
        assert_eq!(extract_message_body(&only_attachments).unwrap(), "No body text found.");
    }

    #[test]
    fn test_body_malformed_is_provider_error() {
        let payload = MessagePart {
            parts: Some(vec![text_part("text/plain", "!!!not base64!!!")]),
            ..Default::default()
        };
        assert!(matches!(extract_message_body(&payload), Err(PipelineError::Provider(_))));
    }

    #[test]
    fn test_extract_attachment_types() {
        let parts = vec![
            file_part("document.pdf"),
            file_part("image.jpg"),
            file_part("noextension"),
        ];
        assert_eq!(extract_attachment_types(&parts), ".pdf,.jpg,unknown");
    }

    #[test]
    fn test_attachment_types_ignores_unnamed_parts() {
        let parts = vec![text_part("text/plain", "aGk"), file_part(""), file_part("a.txt")];
        assert_eq!(extract_attachment_types(&parts), ".txt");
        assert_eq!(extract_attachment_types(&[text_part("text/plain", "aGk")]), "");
        assert_eq!(extract_attachment_types(&[]), "");
    }

    #[test]
    fn test_file_extension_rules() {
        assert_eq!(file_extension("archive.tar.gz"), Some(".gz"));
        assert_eq!(file_extension(".bashrc"), None);
        assert_eq!(file_extension("..hidden.txt"), Some(".txt"));
        assert_eq!(file_extension("dir.d/readme"), None);
        assert_eq!(file_extension("trailing."), Some("."));
    }

    #[test]
    fn test_normalize_message() {
        let message: ProviderMessage = serde_json::from_value(serde_json::json!({
            "id": "12345",
            "internalDate": "1647123456789",
            "payload": {
                "headers": [
                    {"name": "From", "value": "sender@example.com"},
                    {"name": "Subject", "value": "Test Subject"}
                ],
                "body": {"data": "VGhpcyBpcyBhIHRlc3QgZW1haWw="},
                "parts": [
                    {
                        "mimeType": "text/plain",
                        "filename": "test.txt",
                        "body": {"data": "VGhpcyBpcyBhIHRlc3QgZW1haWw="}
                    }
                ]
            }
        }))
        .unwrap();

        let record = normalize_message(&message).unwrap();
        assert_eq!(record.sender.as_deref(), Some("sender@example.com"));
        assert_eq!(record.subject.as_deref(), Some("Test Subject"));
        assert_eq!(record.body, "This is a test email");
        assert_eq!(record.timestamp, Some(1_647_123_456_789));
        assert_eq!(record.attachment_types.as_deref(), Some(".txt"));
    }

    #[test]
    fn test_normalize_missing_headers_and_bad_date() {
        let mut message: ProviderMessage = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "internalDate": "42",
            "payload": {"body": {"data": encode("x")}}
        }))
        .unwrap();
        let record = normalize_message(&message).unwrap();
        assert_eq!(record.sender, None);
        assert_eq!(record.subject, None);
        assert_eq!(record.attachment_types.as_deref(), Some(""));

        message.internal_date = "yesterday".to_string();
        assert!(matches!(normalize_message(&message), Err(PipelineError::Provider(_))));
    }
}
