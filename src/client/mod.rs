//! Service clients: async operation surfaces over the blocking remote seam.
//!
//! [`CalendarClient`] and [`MailClient`] share one [`Connection`]: the
//! bridge, the remote transport, and the credential handle cache. Every
//! remote call goes through the same path, which owns the auth-expiry rule:
//! a call failing with an expired session triggers exactly one credential
//! refresh and one retry of that call; a failing retry surfaces its own
//! mapped error directly.

mod calendar;
mod mail;

pub use calendar::CalendarClient;
pub use mail::MailClient;

use std::sync::Arc;

use crate::bridge::ExecutionBridge;
use crate::domain::{CalendarEvent, EmailMessage, EventId, MessageId, ScopeId};
use crate::error::{ApiError, ApiResult, RemoteError};
use crate::remote::{HandleCache, RemoteService, ServiceHandle};

/// An event argument: either an id or an entity carrying one.
///
/// Resolution to an id happens once, at the operation boundary; operations
/// never branch on which variant they were handed beyond that.
#[derive(Debug, Clone)]
pub enum EventRef {
    Id(EventId),
    Entity(CalendarEvent),
}

impl EventRef {
    /// Resolves to the underlying id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for a pending entity, which has no
    /// id until it is created remotely.
    pub fn into_id(self) -> ApiResult<EventId> {
        match self {
            Self::Id(id) => Ok(id),
            Self::Entity(event) => event.id().cloned().ok_or_else(|| {
                ApiError::validation("event has no id yet; create it before referencing it")
            }),
        }
    }
}

impl From<EventId> for EventRef {
    fn from(id: EventId) -> Self {
        Self::Id(id)
    }
}

impl From<CalendarEvent> for EventRef {
    fn from(event: CalendarEvent) -> Self {
        Self::Entity(event)
    }
}

/// A message argument: either an id or an entity carrying one.
#[derive(Debug, Clone)]
pub enum MessageRef {
    Id(MessageId),
    Entity(EmailMessage),
}

impl MessageRef {
    /// Resolves to the underlying id (messages always carry one).
    pub fn into_id(self) -> MessageId {
        match self {
            Self::Id(id) => id,
            Self::Entity(message) => message.id,
        }
    }
}

impl From<MessageId> for MessageRef {
    fn from(id: MessageId) -> Self {
        Self::Id(id)
    }
}

impl From<EmailMessage> for MessageRef {
    fn from(message: EmailMessage) -> Self {
        Self::Entity(message)
    }
}

/// Shared plumbing behind both clients and the query layer.
#[derive(Clone)]
pub(crate) struct Connection {
    bridge: Arc<ExecutionBridge>,
    remote: Arc<dyn RemoteService>,
    handles: Arc<HandleCache>,
}

impl Connection {
    pub(crate) fn new(
        bridge: Arc<ExecutionBridge>,
        remote: Arc<dyn RemoteService>,
        handles: Arc<HandleCache>,
    ) -> Self {
        Self {
            bridge,
            remote,
            handles,
        }
    }

    pub(crate) fn bridge(&self) -> Arc<ExecutionBridge> {
        Arc::clone(&self.bridge)
    }

    pub(crate) fn remote(&self) -> Arc<dyn RemoteService> {
        Arc::clone(&self.remote)
    }

    pub(crate) fn handles(&self) -> Arc<HandleCache> {
        Arc::clone(&self.handles)
    }

    /// Runs one remote call on the bridge, applying the auth-expiry rule.
    ///
    /// `op` may be invoked twice (original call + the single post-refresh
    /// retry), each time with a freshly built handle.
    pub(crate) async fn call<T, F>(&self, scope: ScopeId, op: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn RemoteService, &ServiceHandle) -> Result<T, RemoteError>
            + Send
            + Sync
            + 'static,
    {
        let remote = self.remote();
        let handles = self.handles();
        self.bridge
            .run(move || call_blocking(remote.as_ref(), &handles, &scope, &op))
            .await
    }
}

/// Blocking form of the retry-once call path, for code already running on a
/// bridge worker (batch item operations).
pub(crate) fn call_blocking<T>(
    remote: &dyn RemoteService,
    handles: &HandleCache,
    scope: &ScopeId,
    op: &dyn Fn(&dyn RemoteService, &ServiceHandle) -> Result<T, RemoteError>,
) -> ApiResult<T> {
    let handle = handles.handle(scope)?;
    match op(remote, &handle) {
        Ok(value) => Ok(value),
        Err(err) if err.is_auth_expired() => {
            tracing::info!(scope = %scope, "session expired; refreshing credentials and retrying");
            handles.refresh(handle.generation())?;
            let handle = handles.handle(scope)?;
            op(remote, &handle).map_err(ApiError::from)
        }
        Err(err) => Err(err.into()),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::connection;
    use super::*;
    use crate::remote::{Collection, MockRemoteService};
    use serde_json::json;

    #[tokio::test]
    async fn call_passes_the_result_through() {
        let mut remote = MockRemoteService::new();
        remote
            .expect_get()
            .times(1)
            .returning(|_, _, _| Ok(json!({"id": "x"})));

        let conn = connection(Arc::new(remote));
        let doc = conn
            .call(ScopeId::default(), |remote, handle| {
                remote.get(handle, Collection::Events, "x")
            })
            .await
            .unwrap();
        assert_eq!(doc["id"], "x");
    }

    #[tokio::test]
    async fn auth_expiry_refreshes_and_retries_exactly_once() {
        let mut remote = MockRemoteService::new();
        let mut calls = 0;
        remote.expect_get().times(2).returning(move |handle, _, _| {
            calls += 1;
            if calls == 1 {
                assert_eq!(handle.token(), "test-token");
                Err(RemoteError::new(401, "token expired"))
            } else {
                assert_eq!(handle.token(), "refreshed-token");
                Ok(json!({"id": "after-refresh"}))
            }
        });

        let conn = connection(Arc::new(remote));
        let doc = conn
            .call(ScopeId::default(), |remote, handle| {
                remote.get(handle, Collection::Events, "x")
            })
            .await
            .unwrap();
        assert_eq!(doc["id"], "after-refresh");
    }

    #[tokio::test]
    async fn failing_retry_surfaces_its_own_error() {
        let mut remote = MockRemoteService::new();
        let mut calls = 0;
        remote.expect_get().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Err(RemoteError::new(401, "token expired"))
            } else {
                Err(RemoteError::new(403, "still not allowed"))
            }
        });

        let conn = connection(Arc::new(remote));
        let err = conn
            .call(ScopeId::default(), |remote, handle| {
                remote.get(handle, Collection::Events, "x")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Permission { status: 403, .. }));
    }

    #[tokio::test]
    async fn non_auth_errors_are_not_retried() {
        let mut remote = MockRemoteService::new();
        remote
            .expect_get()
            .times(1)
            .returning(|_, _, _| Err(RemoteError::new(404, "missing")));

        let conn = connection(Arc::new(remote));
        let err = conn
            .call(ScopeId::default(), |remote, handle| {
                remote.get(handle, Collection::Events, "x")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[test]
    fn pending_event_ref_has_no_id() {
        let start = chrono::Utc::now();
        let end = start + chrono::Duration::hours(1);
        let pending = CalendarEvent::new(start, end).unwrap();
        assert!(matches!(
            EventRef::from(pending).into_id(),
            Err(ApiError::Validation(_))
        ));
        assert_eq!(
            EventRef::from(EventId::from("ev-1")).into_id().unwrap(),
            EventId::from("ev-1")
        );
    }
}
