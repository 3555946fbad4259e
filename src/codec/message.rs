//! Email message, thread, and attachment payload codecs.
//!
//! Gmail-style documents: RFC 822 headers live in `payload.headers`, body
//! content is base64url data nested in a multipart tree, and attachments
//! appear as parts carrying a filename and an `attachmentId` instead of
//! inline data.

use std::collections::BTreeSet;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{json, Map, Value};

use super::{required_str, str_field, EntityCodec};
use crate::domain::{EmailAttachment, EmailMessage, EmailThread, LabelId, MessageId, ThreadId};
use crate::error::{ApiError, ApiResult};
use crate::remote::RawDocument;

const UNREAD_LABEL: &str = "UNREAD";

/// Codec for [`EmailMessage`] documents; also decodes whole threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl EntityCodec for MessageCodec {
    type Entity = EmailMessage;

    fn decode(&self, doc: &RawDocument) -> ApiResult<EmailMessage> {
        let id = MessageId::from(required_str(doc, "id", "message")?);
        let thread_id = ThreadId::from(required_str(doc, "threadId", "message")?);

        let labels: BTreeSet<LabelId> = doc
            .get("labelIds")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(LabelId::from))
                    .collect()
            })
            .unwrap_or_default();
        let is_read = !labels.contains(&LabelId::from(UNREAD_LABEL));

        let payload = doc.get("payload");
        let headers = payload.and_then(|p| p.get("headers")).and_then(|h| h.as_array());

        let mut body = BodyParts::default();
        if let Some(payload) = payload {
            collect_parts(payload, &id, &mut body)?;
        }

        Ok(EmailMessage {
            id,
            thread_id,
            from: header(headers, "From").unwrap_or_default(),
            to: address_list(header(headers, "To")),
            cc: address_list(header(headers, "Cc")),
            bcc: address_list(header(headers, "Bcc")),
            subject: header(headers, "Subject"),
            body_text: body.text,
            body_html: body.html,
            attachments: body.attachments,
            labels,
            is_read,
            reply_to_id: header(headers, "In-Reply-To").map(MessageId::from),
        })
    }

    fn encode(&self, message: &EmailMessage) -> RawDocument {
        let mut headers = vec![header_entry("From", &message.from)];
        if !message.to.is_empty() {
            headers.push(header_entry("To", &message.to.join(", ")));
        }
        if !message.cc.is_empty() {
            headers.push(header_entry("Cc", &message.cc.join(", ")));
        }
        if !message.bcc.is_empty() {
            headers.push(header_entry("Bcc", &message.bcc.join(", ")));
        }
        if let Some(subject) = &message.subject {
            headers.push(header_entry("Subject", subject));
        }
        if let Some(reply_to) = &message.reply_to_id {
            headers.push(header_entry("In-Reply-To", &reply_to.to_string()));
        }

        let mut parts = Vec::new();
        if let Some(text) = &message.body_text {
            parts.push(inline_part("text/plain", text));
        }
        if let Some(html) = &message.body_html {
            parts.push(inline_part("text/html", html));
        }
        for attachment in &message.attachments {
            let mut body = Map::new();
            body.insert("attachmentId".into(), json!(attachment.id.to_string()));
            if let Some(size) = attachment.size_bytes {
                body.insert("size".into(), json!(size));
            }
            parts.push(json!({
                "filename": attachment.filename,
                "mimeType": attachment.mime_type,
                "body": Value::Object(body),
            }));
        }

        json!({
            "id": message.id.to_string(),
            "threadId": message.thread_id.to_string(),
            "labelIds": message.labels.iter().map(|l| l.to_string()).collect::<Vec<_>>(),
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": headers,
                "parts": parts,
            }
        })
    }
}

impl MessageCodec {
    /// Decodes a thread document: `{ "id": ..., "messages": [...] }`.
    pub fn decode_thread(&self, doc: &RawDocument) -> ApiResult<EmailThread> {
        let id = ThreadId::from(required_str(doc, "id", "thread")?);
        let messages = doc
            .get("messages")
            .and_then(|v| v.as_array())
            .map(|docs| docs.iter().map(|d| self.decode(d)).collect::<ApiResult<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();
        Ok(EmailThread { id, messages })
    }
}

/// Decodes the body of an attachment payload document (`{ "data": ... }`).
pub(crate) fn attachment_payload(doc: &RawDocument) -> ApiResult<Vec<u8>> {
    let data = required_str(doc, "data", "attachment")?;
    decode_base64url(data)
}

fn decode_base64url(data: &str) -> ApiResult<Vec<u8>> {
    URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .map_err(|e| ApiError::decode(format!("invalid base64url body data: {e}")))
}

#[derive(Default)]
struct BodyParts {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<EmailAttachment>,
}

/// Walks a payload part tree depth-first, keeping the first text and html
/// bodies encountered and every attachment part in document order.
fn collect_parts(part: &Value, message_id: &MessageId, out: &mut BodyParts) -> ApiResult<()> {
    let filename = str_field(part, "filename").unwrap_or_default();
    let mime_type = str_field(part, "mimeType").unwrap_or_default();
    let body = part.get("body");

    if !filename.is_empty() {
        if let Some(attachment_id) = body.and_then(|b| str_field(b, "attachmentId")) {
            out.attachments.push(EmailAttachment {
                id: attachment_id.into(),
                message_id: message_id.clone(),
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
                size_bytes: body.and_then(|b| b.get("size")).and_then(|s| s.as_u64()),
            });
        }
    } else if let Some(data) = body.and_then(|b| str_field(b, "data")) {
        let decoded = decode_base64url(data)?;
        let content = String::from_utf8(decoded)
            .map_err(|_| ApiError::decode("body part is not valid utf-8".to_string()))?;
        match mime_type {
            "text/plain" if out.text.is_none() => out.text = Some(content),
            "text/html" if out.html.is_none() => out.html = Some(content),
            _ => {}
        }
    }

    if let Some(children) = part.get("parts").and_then(|p| p.as_array()) {
        for child in children {
            collect_parts(child, message_id, out)?;
        }
    }
    Ok(())
}

fn header(headers: Option<&Vec<Value>>, name: &str) -> Option<String> {
    headers?.iter().find_map(|entry| {
        let entry_name = str_field(entry, "name")?;
        if entry_name.eq_ignore_ascii_case(name) {
            str_field(entry, "value").map(String::from)
        } else {
            None
        }
    })
}

fn address_list(raw: Option<String>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn header_entry(name: &str, value: &str) -> Value {
    json!({ "name": name, "value": value })
}

fn inline_part(mime_type: &str, content: &str) -> Value {
    json!({
        "filename": "",
        "mimeType": mime_type,
        "body": { "data": URL_SAFE.encode(content.as_bytes()) }
    })
}
