//! Domain layer types for the client bridge.
//!
//! This module contains the entities flowing through the query builders,
//! batch coordinator, and clients: calendar events with attendees, email
//! messages with threads and attachment metadata, and labels.

mod email;
mod event;
mod label;
mod types;

pub use email::{EmailAttachment, EmailMessage, EmailThread};
pub use event::{
    Attendee, CalendarEvent, ResponseStatus, MAX_DESCRIPTION_LENGTH, MAX_LOCATION_LENGTH,
    MAX_SUMMARY_LENGTH,
};
pub use label::{Label, LabelKind};
pub use types::{AttachmentId, EventId, LabelId, MessageId, ScopeId, ThreadId};

pub(crate) use event::is_valid_email;
