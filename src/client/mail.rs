//! Mail operations.

use std::sync::Arc;

use serde_json::json;

use crate::batch::{BatchCoordinator, BatchPolicy, ItemOutcome};
use crate::bridge::ExecutionBridge;
use crate::codec::{attachment_payload, EntityCodec, LabelCodec, MessageCodec};
use crate::domain::{EmailAttachment, EmailMessage, EmailThread, Label, LabelId, MessageId, ScopeId, ThreadId};
use crate::error::ApiResult;
use crate::query::{MessageQuery, Query};
use crate::remote::{Collection, HandleCache, ListParams, RawDocument, RemoteService};

use super::{call_blocking, Connection, MessageRef};

const UNREAD_LABEL: &str = "UNREAD";

/// Async client for the mail service.
pub struct MailClient {
    connection: Connection,
    batch: BatchCoordinator,
}

impl MailClient {
    pub fn new(
        bridge: Arc<ExecutionBridge>,
        remote: Arc<dyn RemoteService>,
        handles: Arc<HandleCache>,
    ) -> Self {
        let connection = Connection::new(bridge, remote, handles);
        let batch = BatchCoordinator::new(connection.bridge());
        Self { connection, batch }
    }

    /// Lists messages in a scope with default query settings.
    pub async fn list_messages(&self, scope: &ScopeId) -> ApiResult<Vec<EmailMessage>> {
        self.query().scope(scope.clone()).execute().await
    }

    /// Starts a fluent message query (scope defaults to `"primary"`).
    pub fn query(&self) -> MessageQuery {
        Query::new(self.connection.clone(), MessageCodec, Collection::Messages)
    }

    /// Fetches one message.
    pub async fn get_message(
        &self,
        scope: &ScopeId,
        message: impl Into<MessageRef>,
    ) -> ApiResult<EmailMessage> {
        let id = message.into().into_id();
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.get(handle, Collection::Messages, &id.to_string())
            })
            .await?;
        MessageCodec.decode(&doc)
    }

    /// Fetches a whole conversation in chronological order.
    pub async fn get_thread(&self, scope: &ScopeId, thread: ThreadId) -> ApiResult<EmailThread> {
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.get(handle, Collection::Threads, &thread.to_string())
            })
            .await?;
        MessageCodec.decode_thread(&doc)
    }

    /// Deletes a message (the service moves it to trash rather than purging).
    ///
    /// A timeout on this call does not guarantee the deletion did not happen.
    pub async fn delete_message(
        &self,
        scope: &ScopeId,
        message: impl Into<MessageRef>,
    ) -> ApiResult<()> {
        let id = message.into().into_id();
        tracing::info!(scope = %scope, message = %id, "deleting message");
        self.connection
            .call(scope.clone(), move |remote, handle| {
                remote.delete(handle, Collection::Messages, &id.to_string())
            })
            .await
    }

    /// Adds and removes labels in one remote mutation; returns the message
    /// re-decoded from the service's response.
    ///
    /// This is the only path that changes a message's read state: `is_read`
    /// on the returned entity reflects the confirmed label set.
    pub async fn modify_labels(
        &self,
        scope: &ScopeId,
        message: impl Into<MessageRef>,
        add: Vec<LabelId>,
        remove: Vec<LabelId>,
    ) -> ApiResult<EmailMessage> {
        let id = message.into().into_id();
        tracing::info!(
            scope = %scope,
            message = %id,
            added = add.len(),
            removed = remove.len(),
            "modifying labels"
        );
        let body = modify_body(&add, &remove);
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.patch(handle, Collection::Messages, &id.to_string(), &body)
            })
            .await?;
        MessageCodec.decode(&doc)
    }

    /// Removes the unread marker.
    pub async fn mark_read(
        &self,
        scope: &ScopeId,
        message: impl Into<MessageRef>,
    ) -> ApiResult<EmailMessage> {
        self.modify_labels(scope, message, vec![], vec![LabelId::from(UNREAD_LABEL)])
            .await
    }

    /// Restores the unread marker.
    pub async fn mark_unread(
        &self,
        scope: &ScopeId,
        message: impl Into<MessageRef>,
    ) -> ApiResult<EmailMessage> {
        self.modify_labels(scope, message, vec![LabelId::from(UNREAD_LABEL)], vec![])
            .await
    }

    /// Lists all labels in a scope.
    pub async fn list_labels(&self, scope: &ScopeId) -> ApiResult<Vec<Label>> {
        let page = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.list(handle, Collection::Labels, &ListParams::default())
            })
            .await?;
        let mut labels = Vec::with_capacity(page.items.len());
        for doc in &page.items {
            match LabelCodec.decode(doc) {
                Ok(label) => labels.push(label),
                Err(err) => tracing::warn!(scope = %scope, error = %err, "skipping undecodable label"),
            }
        }
        Ok(labels)
    }

    /// Fetches one label.
    pub async fn get_label(&self, scope: &ScopeId, label: LabelId) -> ApiResult<Label> {
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.get(handle, Collection::Labels, &label.to_string())
            })
            .await?;
        LabelCodec.decode(&doc)
    }

    /// Creates a user label; returns the stored form with its server-assigned
    /// id.
    pub async fn create_label(
        &self,
        scope: &ScopeId,
        name: impl Into<String>,
    ) -> ApiResult<Label> {
        let name = name.into();
        tracing::info!(scope = %scope, name = %name, "creating label");
        let body = json!({ "name": name, "type": "user" });
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.insert(handle, Collection::Labels, &body)
            })
            .await?;
        LabelCodec.decode(&doc)
    }

    /// Renames a label; returns the stored form.
    pub async fn update_label(
        &self,
        scope: &ScopeId,
        label: LabelId,
        new_name: impl Into<String>,
    ) -> ApiResult<Label> {
        let new_name = new_name.into();
        tracing::info!(scope = %scope, label = %label, name = %new_name, "renaming label");
        let body = json!({ "name": new_name });
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.patch(handle, Collection::Labels, &label.to_string(), &body)
            })
            .await?;
        LabelCodec.decode(&doc)
    }

    /// Deletes a label. Messages carrying it keep their other labels.
    pub async fn delete_label(&self, scope: &ScopeId, label: LabelId) -> ApiResult<()> {
        tracing::info!(scope = %scope, label = %label, "deleting label");
        self.connection
            .call(scope.clone(), move |remote, handle| {
                remote.delete(handle, Collection::Labels, &label.to_string())
            })
            .await
    }

    /// Fetches an attachment's payload on demand.
    pub async fn fetch_attachment(
        &self,
        scope: &ScopeId,
        attachment: &EmailAttachment,
    ) -> ApiResult<Vec<u8>> {
        let id = format!("{}/{}", attachment.message_id, attachment.id);
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.get(handle, Collection::Attachments, &id)
            })
            .await?;
        attachment_payload(&doc)
    }

    /// Fetches many messages concurrently.
    pub async fn batch_get(
        &self,
        scope: &ScopeId,
        ids: Vec<MessageId>,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<EmailMessage>>> {
        let remote = self.connection.remote();
        let handles = self.connection.handles();
        let scope = scope.clone();
        self.batch
            .run(
                ids,
                move |id| {
                    let doc = call_blocking(remote.as_ref(), &handles, &scope, &|r, h| {
                        r.get(h, Collection::Messages, &id.to_string())
                    })?;
                    MessageCodec.decode(&doc)
                },
                policy,
            )
            .await
    }

    /// Deletes many messages concurrently.
    pub async fn batch_delete(
        &self,
        scope: &ScopeId,
        messages: Vec<MessageRef>,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<()>>> {
        let remote = self.connection.remote();
        let handles = self.connection.handles();
        let scope = scope.clone();
        self.batch
            .run(
                messages,
                move |message| {
                    let id = message.into_id();
                    call_blocking(remote.as_ref(), &handles, &scope, &|r, h| {
                        r.delete(h, Collection::Messages, &id.to_string())
                    })
                },
                policy,
            )
            .await
    }

    /// Applies the same label mutation to many messages concurrently.
    pub async fn batch_modify_labels(
        &self,
        scope: &ScopeId,
        messages: Vec<MessageRef>,
        add: Vec<LabelId>,
        remove: Vec<LabelId>,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<EmailMessage>>> {
        let remote = self.connection.remote();
        let handles = self.connection.handles();
        let scope = scope.clone();
        let body = modify_body(&add, &remove);
        self.batch
            .run(
                messages,
                move |message| {
                    let id = message.into_id();
                    let doc = call_blocking(remote.as_ref(), &handles, &scope, &|r, h| {
                        r.patch(h, Collection::Messages, &id.to_string(), &body)
                    })?;
                    MessageCodec.decode(&doc)
                },
                policy,
            )
            .await
    }
}

fn modify_body(add: &[LabelId], remove: &[LabelId]) -> RawDocument {
    json!({
        "addLabelIds": add.iter().map(|l| l.to_string()).collect::<Vec<_>>(),
        "removeLabelIds": remove.iter().map(|l| l.to_string()).collect::<Vec<_>>(),
    })
}
