//! HTTP-backed [`RemoteService`] implementation.
//!
//! Uses a blocking `reqwest` client; every method is one synchronous round
//! trip and must only run on a bridge worker thread. Transport-level failures
//! (connect, timeout, malformed URL) are reported with status `0` since no
//! service status exists for them.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use url::Url;

use super::{Collection, ListParams, RawDocument, RawPage, RemoteService, ServiceHandle};
use crate::error::{ApiError, ApiResult, RemoteError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to a Google-Workspace-style REST surface.
pub struct HttpRemoteService {
    client: Client,
    base_url: Url,
}

impl HttpRemoteService {
    /// Creates a service rooted at `base_url` (must end with `/` for path
    /// joining to behave).
    pub fn new(base_url: Url) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: Option<&str>,
    ) -> Result<Url, RemoteError> {
        let path = resource_path(handle, collection, id);
        self.base_url
            .join(&path)
            .map_err(|e| RemoteError::new(0, format!("invalid endpoint {path}: {e}")))
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .map_err(|e| RemoteError::new(0, format!("transport failure: {e}")))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_envelope(response))
        }
    }

    fn read_document(response: Response) -> Result<RawDocument, RemoteError> {
        response
            .json()
            .map_err(|e| RemoteError::new(0, format!("unreadable response body: {e}")))
    }
}

impl RemoteService for HttpRemoteService {
    fn list(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        params: &ListParams,
    ) -> Result<RawPage, RemoteError> {
        let url = self.endpoint(handle, collection, None)?;
        tracing::debug!(%url, scope = %handle.scope(), "remote list");
        let request = self
            .client
            .get(url)
            .bearer_auth(handle.token())
            .query(&list_query(params));
        let document = Self::read_document(self.send(request)?)?;
        Ok(parse_page(document))
    }

    fn get(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
    ) -> Result<RawDocument, RemoteError> {
        let url = self.endpoint(handle, collection, Some(id))?;
        tracing::debug!(%url, scope = %handle.scope(), "remote get");
        let request = self.client.get(url).bearer_auth(handle.token());
        Self::read_document(self.send(request)?)
    }

    fn insert(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError> {
        let url = self.endpoint(handle, collection, None)?;
        tracing::debug!(%url, scope = %handle.scope(), "remote insert");
        let request = self.client.post(url).bearer_auth(handle.token()).json(doc);
        Self::read_document(self.send(request)?)
    }

    fn update(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError> {
        let url = self.endpoint(handle, collection, Some(id))?;
        tracing::debug!(%url, scope = %handle.scope(), "remote update");
        let request = self.client.put(url).bearer_auth(handle.token()).json(doc);
        Self::read_document(self.send(request)?)
    }

    fn patch(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError> {
        let url = self.endpoint(handle, collection, Some(id))?;
        tracing::debug!(%url, scope = %handle.scope(), "remote patch");
        let request = self.client.patch(url).bearer_auth(handle.token()).json(doc);
        Self::read_document(self.send(request)?)
    }

    fn delete(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(handle, collection, Some(id))?;
        tracing::debug!(%url, scope = %handle.scope(), "remote delete");
        let request = self.client.delete(url).bearer_auth(handle.token());
        self.send(request)?;
        Ok(())
    }
}

fn resource_path(handle: &ServiceHandle, collection: Collection, id: Option<&str>) -> String {
    let scope = handle.scope();
    let base = match collection {
        Collection::Events => format!("calendars/{scope}/events"),
        Collection::Messages => format!("users/{scope}/messages"),
        Collection::Threads => format!("users/{scope}/threads"),
        Collection::Labels => format!("users/{scope}/labels"),
        // Compound id "{message_id}/{attachment_id}".
        Collection::Attachments => {
            let (message_id, attachment_id) = id
                .and_then(|id| id.split_once('/'))
                .unwrap_or(("", ""));
            return format!("users/{scope}/messages/{message_id}/attachments/{attachment_id}");
        }
    };
    match id {
        Some(id) => format!("{base}/{id}"),
        None => base,
    }
}

fn list_query(params: &ListParams) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(limit) = params.limit {
        query.push(("maxResults", limit.to_string()));
    }
    if let Some(time_min) = params.time_min {
        query.push(("timeMin", time_min.to_rfc3339()));
    }
    if let Some(time_max) = params.time_max {
        query.push(("timeMax", time_max.to_rfc3339()));
    }
    if let Some(text) = &params.text {
        query.push(("q", text.clone()));
    }
    for label in &params.label_ids {
        query.push(("labelIds", label.to_string()));
    }
    if let Some(token) = &params.page_token {
        query.push(("pageToken", token.clone()));
    }
    query
}

fn parse_page(document: RawDocument) -> RawPage {
    let next_page_token = document
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .map(String::from);
    let items = ["items", "messages", "threads", "labels"]
        .iter()
        .find_map(|key| document.get(*key).and_then(|v| v.as_array()).cloned())
        .unwrap_or_default();
    RawPage {
        items,
        next_page_token,
    }
}

fn error_envelope(response: Response) -> RemoteError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or(body);
    RemoteError::new(status, message)
}
