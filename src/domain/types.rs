//! Core identifier types for domain entities.
//!
//! These newtype wrappers provide type safety for entity identifiers,
//! preventing accidental mixing of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// A mailbox or calendar identifier that a query or operation targets,
    /// e.g. `"primary"` or a shared calendar's id.
    ScopeId
}

string_id! {
    /// Unique identifier for a calendar event, assigned by the remote service.
    EventId
}

string_id! {
    /// Unique identifier for an individual email message.
    MessageId
}

string_id! {
    /// Unique identifier for an email thread (conversation).
    ThreadId
}

string_id! {
    /// Unique identifier for a label (folder/tag).
    LabelId
}

string_id! {
    /// Unique identifier for an attachment within a message.
    AttachmentId
}

impl Default for ScopeId {
    fn default() -> Self {
        Self("primary".to_owned())
    }
}
