//! Wire codecs: raw remote documents to domain entities and back.
//!
//! Decoding a malformed document fails with [`ApiError::Decode`] and aborts
//! only the item being decoded; callers iterating a page or a batch keep
//! going or surface the error per their own policy. Encoding is total for any
//! invariant-satisfying entity.

mod event;
mod label;
mod message;

pub use event::EventCodec;
pub use label::LabelCodec;
pub use message::MessageCodec;

pub(crate) use message::attachment_payload;

use crate::error::{ApiError, ApiResult};
use crate::remote::RawDocument;

/// Mapping between one entity type and its wire document form.
pub trait EntityCodec: Send + Sync {
    /// The domain entity this codec produces and consumes.
    type Entity;

    /// Interprets a remote document as an entity.
    fn decode(&self, doc: &RawDocument) -> ApiResult<Self::Entity>;

    /// Renders an entity as the document the service expects.
    fn encode(&self, entity: &Self::Entity) -> RawDocument;
}

pub(crate) fn str_field<'a>(doc: &'a RawDocument, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(|v| v.as_str())
}

pub(crate) fn required_str<'a>(doc: &'a RawDocument, key: &str, entity: &str) -> ApiResult<&'a str> {
    str_field(doc, key)
        .ok_or_else(|| ApiError::decode(format!("{entity} document missing field {key}")))
}
