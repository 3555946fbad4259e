//! Label codec.

use serde_json::json;

use super::{required_str, str_field, EntityCodec};
use crate::domain::{Label, LabelId, LabelKind};
use crate::error::ApiResult;
use crate::remote::RawDocument;

/// Codec for [`Label`] documents (`{ "id", "name", "type" }`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelCodec;

impl EntityCodec for LabelCodec {
    type Entity = Label;

    fn decode(&self, doc: &RawDocument) -> ApiResult<Label> {
        let id = required_str(doc, "id", "label")?;
        let name = required_str(doc, "name", "label")?;
        // Anything the service does not mark as system-owned is user-owned.
        let kind = match str_field(doc, "type") {
            Some("system") => LabelKind::System,
            _ => LabelKind::User,
        };
        Ok(Label::new(LabelId::from(id), name, kind))
    }

    fn encode(&self, label: &Label) -> RawDocument {
        let kind = match label.kind {
            LabelKind::System => "system",
            LabelKind::User => "user",
        };
        json!({
            "id": label.id.to_string(),
            "name": label.name,
            "type": kind,
        })
    }
}
