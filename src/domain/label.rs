//! Label domain type.

use serde::{Deserialize, Serialize};

use super::LabelId;

/// Whether a label is provided by the service or created by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    /// Built-in label (INBOX, SENT, UNREAD, ...).
    System,
    /// User-created label.
    User,
}

/// A mailbox label (folder/tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// Unique identifier.
    pub id: LabelId,
    /// Display name.
    pub name: String,
    /// System or user label.
    pub kind: LabelKind,
}

impl Label {
    /// Creates a label.
    pub fn new(id: impl Into<LabelId>, name: impl Into<String>, kind: LabelKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}
