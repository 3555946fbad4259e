//! The synchronous remote seam.
//!
//! Everything above this module is async; everything below it is a plain
//! blocking call. [`RemoteService`] is the single trait the clients talk
//! through, always from a bridge worker thread, and it deals only in raw wire
//! documents; entity mapping lives in the codec layer.

mod handles;
mod http;

pub use handles::{CredentialProvider, CredentialSession, HandleCache, ServiceHandle};
pub use http::HttpRemoteService;

use chrono::{DateTime, Utc};

use crate::domain::LabelId;
use crate::error::RemoteError;

/// Raw wire document, exactly as the service sent or expects it.
pub type RawDocument = serde_json::Value;

/// One page of a list call.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Documents in remote order.
    pub items: Vec<RawDocument>,
    /// Continuation token; `None` means the listing is exhausted.
    pub next_page_token: Option<String>,
}

/// The resource collections the remote service exposes.
///
/// Attachments are addressed beneath their message, so their document ids
/// take the compound form `"{message_id}/{attachment_id}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Events,
    Messages,
    Threads,
    Labels,
    Attachments,
}

/// Server-side listing parameters.
///
/// Only constraints the service can evaluate belong here; client-side
/// post-filters are applied by the query layer after decoding.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Maximum items the caller wants overall; the service may page smaller.
    pub limit: Option<usize>,
    /// Inclusive lower bound on the item's primary timestamp.
    pub time_min: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the item's primary timestamp.
    pub time_max: Option<DateTime<Utc>>,
    /// Free-text search expression.
    pub text: Option<String>,
    /// Restrict to items carrying all of these labels.
    pub label_ids: Vec<LabelId>,
    /// Continuation token from a previous page.
    pub page_token: Option<String>,
}

/// Blocking transport to the remote multi-service API.
///
/// Implementations must be callable from any bridge worker thread. All
/// methods are one network round trip; retries and auth recovery are layered
/// above this trait.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteService: Send + Sync {
    /// Lists one page of a collection.
    fn list(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        params: &ListParams,
    ) -> Result<RawPage, RemoteError>;

    /// Fetches a single document by id.
    fn get(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
    ) -> Result<RawDocument, RemoteError>;

    /// Creates a document; returns the stored form with server-assigned fields.
    fn insert(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError>;

    /// Replaces a document wholesale; returns the stored form.
    fn update(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError>;

    /// Applies a partial modification; returns the stored form.
    fn patch(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError>;

    /// Deletes a document.
    fn delete(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
    ) -> Result<(), RemoteError>;
}
