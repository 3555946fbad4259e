//! Calendar operations.

use std::sync::Arc;

use crate::batch::{BatchCoordinator, BatchPolicy, ItemOutcome};
use crate::bridge::ExecutionBridge;
use crate::codec::{EntityCodec, EventCodec};
use crate::domain::{CalendarEvent, EventId, ScopeId};
use crate::error::{ApiError, ApiResult};
use crate::query::{EventQuery, Query};
use crate::remote::{Collection, HandleCache, RemoteService};

use super::{call_blocking, Connection, EventRef};

/// Async client for the calendar service.
///
/// Mutating an entity locally never talks to the network; `create_event` and
/// `update_event` are the explicit synchronize steps.
pub struct CalendarClient {
    connection: Connection,
    batch: BatchCoordinator,
}

impl CalendarClient {
    pub fn new(
        bridge: Arc<ExecutionBridge>,
        remote: Arc<dyn RemoteService>,
        handles: Arc<HandleCache>,
    ) -> Self {
        let connection = Connection::new(bridge, remote, handles);
        let batch = BatchCoordinator::new(connection.bridge());
        Self { connection, batch }
    }

    /// Lists events in a scope with default query settings.
    pub async fn list_events(&self, scope: &ScopeId) -> ApiResult<Vec<CalendarEvent>> {
        self.query().scope(scope.clone()).execute().await
    }

    /// Starts a fluent event query (scope defaults to `"primary"`).
    pub fn query(&self) -> EventQuery {
        Query::new(self.connection.clone(), EventCodec, Collection::Events)
    }

    /// Fetches one event.
    pub async fn get_event(
        &self,
        scope: &ScopeId,
        event: impl Into<EventRef>,
    ) -> ApiResult<CalendarEvent> {
        let id = event.into().into_id()?;
        let doc = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.get(handle, Collection::Events, &id.to_string())
            })
            .await?;
        EventCodec.decode(&doc)
    }

    /// Creates a pending event remotely; returns the stored form with its
    /// server-assigned id and link.
    pub async fn create_event(
        &self,
        scope: &ScopeId,
        event: &CalendarEvent,
    ) -> ApiResult<CalendarEvent> {
        if event.id().is_some() {
            return Err(ApiError::validation(
                "event already has an id; use update_event to synchronize changes",
            ));
        }
        tracing::info!(scope = %scope, summary = event.summary().unwrap_or(""), "creating event");
        let doc = EventCodec.encode(event);
        let stored = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.insert(handle, Collection::Events, &doc)
            })
            .await?;
        EventCodec.decode(&stored)
    }

    /// Pushes local changes to an already-created event; returns the stored
    /// form.
    pub async fn update_event(
        &self,
        scope: &ScopeId,
        event: &CalendarEvent,
    ) -> ApiResult<CalendarEvent> {
        let id = event.id().cloned().ok_or_else(|| {
            ApiError::validation("event has no id yet; use create_event first")
        })?;
        tracing::info!(scope = %scope, event = %id, "updating event");
        let doc = EventCodec.encode(event);
        let stored = self
            .connection
            .call(scope.clone(), move |remote, handle| {
                remote.update(handle, Collection::Events, &id.to_string(), &doc)
            })
            .await?;
        EventCodec.decode(&stored)
    }

    /// Deletes an event.
    ///
    /// With `all_recurrence` set, deleting an instance of a recurring series
    /// resolves and deletes the whole series (one extra fetch). A timeout on
    /// this call does not guarantee the deletion did not happen.
    pub async fn delete_event(
        &self,
        scope: &ScopeId,
        event: impl Into<EventRef>,
        all_recurrence: bool,
    ) -> ApiResult<()> {
        let mut id = event.into().into_id()?;
        if all_recurrence {
            let fetched = self.get_event(scope, id.clone()).await?;
            if let Some(series) = fetched.recurring_event_id() {
                id = series.clone();
            }
        }
        tracing::info!(scope = %scope, event = %id, all_recurrence, "deleting event");
        self.connection
            .call(scope.clone(), move |remote, handle| {
                remote.delete(handle, Collection::Events, &id.to_string())
            })
            .await
    }

    /// Fetches many events concurrently.
    pub async fn batch_get(
        &self,
        scope: &ScopeId,
        ids: Vec<EventId>,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<CalendarEvent>>> {
        let remote = self.connection.remote();
        let handles = self.connection.handles();
        let scope = scope.clone();
        self.batch
            .run(
                ids,
                move |id| {
                    let doc = call_blocking(remote.as_ref(), &handles, &scope, &|r, h| {
                        r.get(h, Collection::Events, &id.to_string())
                    })?;
                    EventCodec.decode(&doc)
                },
                policy,
            )
            .await
    }

    /// Creates many pending events concurrently.
    pub async fn batch_create(
        &self,
        scope: &ScopeId,
        events: Vec<CalendarEvent>,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<CalendarEvent>>> {
        let remote = self.connection.remote();
        let handles = self.connection.handles();
        let scope = scope.clone();
        self.batch
            .run(
                events,
                move |event| {
                    if event.id().is_some() {
                        return Err(ApiError::validation(
                            "event already has an id; use batch_update",
                        ));
                    }
                    let doc = EventCodec.encode(&event);
                    let stored = call_blocking(remote.as_ref(), &handles, &scope, &|r, h| {
                        r.insert(h, Collection::Events, &doc)
                    })?;
                    EventCodec.decode(&stored)
                },
                policy,
            )
            .await
    }

    /// Updates many events concurrently; every event must carry an id.
    pub async fn batch_update(
        &self,
        scope: &ScopeId,
        events: Vec<CalendarEvent>,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<CalendarEvent>>> {
        let remote = self.connection.remote();
        let handles = self.connection.handles();
        let scope = scope.clone();
        self.batch
            .run(
                events,
                move |event| {
                    let id = event.id().cloned().ok_or_else(|| {
                        ApiError::validation("event has no id yet; use batch_create")
                    })?;
                    let doc = EventCodec.encode(&event);
                    let stored = call_blocking(remote.as_ref(), &handles, &scope, &|r, h| {
                        r.update(h, Collection::Events, &id.to_string(), &doc)
                    })?;
                    EventCodec.decode(&stored)
                },
                policy,
            )
            .await
    }

    /// Deletes many events concurrently (single instances only).
    pub async fn batch_delete(
        &self,
        scope: &ScopeId,
        events: Vec<EventRef>,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<()>>> {
        let remote = self.connection.remote();
        let handles = self.connection.handles();
        let scope = scope.clone();
        self.batch
            .run(
                events,
                move |event| {
                    let id = event.into_id()?;
                    call_blocking(remote.as_ref(), &handles, &scope, &|r, h| {
                        r.delete(h, Collection::Events, &id.to_string())
                    })
                },
                policy,
            )
            .await
    }
}
