//! Email domain types.
//!
//! Represents individual email messages, threads, and attachment metadata.

use std::collections::BTreeSet;

use super::{AttachmentId, LabelId, MessageId, ThreadId};

/// An individual email message as hydrated from the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// Thread (conversation) this message belongs to.
    pub thread_id: ThreadId,
    /// Sender address.
    pub from: String,
    /// Primary recipient addresses.
    pub to: Vec<String>,
    /// Carbon copy recipient addresses.
    pub cc: Vec<String>,
    /// Blind carbon copy recipient addresses.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Plain text body content.
    pub body_text: Option<String>,
    /// HTML body content.
    pub body_html: Option<String>,
    /// Attachment metadata in payload order. Payload bytes are fetched on
    /// demand via the mail client and never cached here.
    pub attachments: Vec<EmailAttachment>,
    /// Labels applied to this message.
    pub labels: BTreeSet<LabelId>,
    /// Client-cached read state, derived from the UNREAD label. Only the mail
    /// client updates it, and only after a confirmed remote label mutation.
    pub is_read: bool,
    /// Message this one replies to, if any.
    pub reply_to_id: Option<MessageId>,
}

impl EmailMessage {
    /// Whether the given label is applied to this message.
    pub fn has_label(&self, label: &LabelId) -> bool {
        self.labels.contains(label)
    }

    /// Whether this message carries any attachments.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Attachment metadata on a message.
///
/// Holds a back-reference to the owning message, not ownership of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    /// Identifier used to fetch the payload.
    pub id: AttachmentId,
    /// The message this attachment belongs to.
    pub message_id: MessageId,
    /// Original filename.
    pub filename: String,
    /// MIME content type.
    pub mime_type: String,
    /// Size in bytes as reported by the service, if known.
    pub size_bytes: Option<u64>,
}

/// A conversation: messages in chronological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailThread {
    /// Thread identifier.
    pub id: ThreadId,
    /// Messages in chronological order.
    pub messages: Vec<EmailMessage>,
}

impl EmailThread {
    /// Number of messages in the thread.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the thread has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of unread messages.
    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_read).count()
    }
}
