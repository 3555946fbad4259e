//! End-to-end scenarios against an in-process fake remote service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use tether::domain::{Attendee, CalendarEvent, EventId, LabelId, MessageId, ScopeId};
use tether::error::{ApiError, RemoteError};
use tether::remote::{
    Collection, CredentialProvider, CredentialSession, HandleCache, ListParams, RawDocument,
    RawPage, RemoteService, ServiceHandle,
};
use tether::{BatchPolicy, BridgeConfig, CalendarClient, ExecutionBridge, MailClient};

const INITIAL_TOKEN: &str = "token-initial";
const REFRESHED_TOKEN: &str = "token-refreshed";

/// Credential source that counts how often it is asked to refresh.
#[derive(Default)]
struct CountingProvider {
    refreshes: AtomicUsize,
}

impl CredentialProvider for CountingProvider {
    fn session(&self) -> Result<CredentialSession, RemoteError> {
        Ok(CredentialSession::new(INITIAL_TOKEN, None))
    }

    fn refresh(&self, _: &CredentialSession) -> Result<CredentialSession, RemoteError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(CredentialSession::new(REFRESHED_TOKEN, None))
    }
}

/// In-memory remote: per-scope document stores plus a few failure knobs.
#[derive(Default)]
struct InMemoryRemote {
    events: Mutex<BTreeMap<String, Value>>,
    messages: Mutex<BTreeMap<String, Value>>,
    attachments: Mutex<BTreeMap<String, Value>>,
    next_id: AtomicUsize,
    /// When set, the initial token is treated as expired (401).
    expired: AtomicBool,
    /// When set, every authenticated call is denied (403).
    deny_all: AtomicBool,
    /// Ids whose `get` stalls briefly, to stagger batch completion order.
    slow_ids: Mutex<Vec<String>>,
    list_calls: Mutex<Vec<(String, Option<usize>, Option<String>)>>,
}

impl InMemoryRemote {
    fn seed_event(&self, scope: &str, id: &str, doc: Value) {
        self.events
            .lock()
            .unwrap()
            .insert(key(scope, id), doc);
    }

    fn seed_message(&self, scope: &str, id: &str, doc: Value) {
        self.messages
            .lock()
            .unwrap()
            .insert(key(scope, id), doc);
    }

    fn check_auth(&self, handle: &ServiceHandle) -> Result<(), RemoteError> {
        if self.expired.load(Ordering::SeqCst) && handle.token() == INITIAL_TOKEN {
            return Err(RemoteError::new(401, "session expired"));
        }
        if self.deny_all.load(Ordering::SeqCst) {
            return Err(RemoteError::new(403, "access denied"));
        }
        Ok(())
    }

    fn store(&self, collection: Collection) -> &Mutex<BTreeMap<String, Value>> {
        match collection {
            Collection::Events => &self.events,
            Collection::Attachments => &self.attachments,
            _ => &self.messages,
        }
    }
}

fn key(scope: &str, id: &str) -> String {
    format!("{scope}:{id}")
}

impl RemoteService for InMemoryRemote {
    fn list(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        params: &ListParams,
    ) -> Result<RawPage, RemoteError> {
        self.check_auth(handle)?;
        self.list_calls.lock().unwrap().push((
            handle.scope().to_string(),
            params.limit,
            params.text.clone(),
        ));

        let prefix = format!("{}:", handle.scope());
        let store = self.store(collection).lock().unwrap();
        let mut items: Vec<Value> = store
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, doc)| doc.clone())
            .filter(|doc| match &params.text {
                Some(text) => doc["summary"]
                    .as_str()
                    .is_some_and(|summary| summary.contains(text.as_str())),
                None => true,
            })
            .filter(|doc| {
                params.label_ids.iter().all(|label| {
                    doc["labelIds"]
                        .as_array()
                        .is_some_and(|ids| ids.iter().any(|id| id == &json!(label.to_string())))
                })
            })
            .collect();
        if let Some(limit) = params.limit {
            items.truncate(limit);
        }
        Ok(RawPage {
            items,
            next_page_token: None,
        })
    }

    fn get(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
    ) -> Result<RawDocument, RemoteError> {
        self.check_auth(handle)?;
        if self.slow_ids.lock().unwrap().iter().any(|slow| slow == id) {
            std::thread::sleep(Duration::from_millis(30));
        }
        self.store(collection)
            .lock()
            .unwrap()
            .get(&key(handle.scope().as_ref(), id))
            .cloned()
            .ok_or_else(|| RemoteError::new(404, format!("{id} not found")))
    }

    fn insert(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError> {
        self.check_auth(handle)?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("srv-{n}");
        let mut stored = doc.clone();
        stored["id"] = json!(id);
        stored["htmlLink"] = json!(format!("https://calendar.example.com/{id}"));
        self.store(collection)
            .lock()
            .unwrap()
            .insert(key(handle.scope().as_ref(), &id), stored.clone());
        Ok(stored)
    }

    fn update(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError> {
        self.check_auth(handle)?;
        let mut store = self.store(collection).lock().unwrap();
        let slot = store
            .get_mut(&key(handle.scope().as_ref(), id))
            .ok_or_else(|| RemoteError::new(404, format!("{id} not found")))?;
        *slot = doc.clone();
        Ok(slot.clone())
    }

    fn patch(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
        doc: &RawDocument,
    ) -> Result<RawDocument, RemoteError> {
        self.check_auth(handle)?;
        let mut store = self.store(collection).lock().unwrap();
        let slot = store
            .get_mut(&key(handle.scope().as_ref(), id))
            .ok_or_else(|| RemoteError::new(404, format!("{id} not found")))?;

        // Label mutation semantics for message documents.
        let mut labels: Vec<String> = slot["labelIds"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(remove) = doc["removeLabelIds"].as_array() {
            labels.retain(|label| !remove.iter().any(|r| r == &json!(label)));
        }
        if let Some(add) = doc["addLabelIds"].as_array() {
            for label in add.iter().filter_map(|v| v.as_str()) {
                if !labels.iter().any(|l| l == label) {
                    labels.push(label.to_string());
                }
            }
        }
        slot["labelIds"] = json!(labels);
        Ok(slot.clone())
    }

    fn delete(
        &self,
        handle: &ServiceHandle,
        collection: Collection,
        id: &str,
    ) -> Result<(), RemoteError> {
        self.check_auth(handle)?;
        self.store(collection)
            .lock()
            .unwrap()
            .remove(&key(handle.scope().as_ref(), id))
            .map(|_| ())
            .ok_or_else(|| RemoteError::new(404, format!("{id} not found")))
    }
}

struct Harness {
    calendar: CalendarClient,
    mail: MailClient,
    remote: Arc<InMemoryRemote>,
    provider: Arc<CountingProvider>,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let remote = Arc::new(InMemoryRemote::default());
    let provider = Arc::new(CountingProvider::default());
    let bridge = Arc::new(ExecutionBridge::new(BridgeConfig::default()).unwrap());
    let handles = Arc::new(HandleCache::new(
        provider.clone() as Arc<dyn CredentialProvider>
    ));
    Harness {
        calendar: CalendarClient::new(bridge.clone(), remote.clone(), handles.clone()),
        mail: MailClient::new(bridge, remote.clone(), handles),
        remote,
        provider,
    }
}

fn event_doc(id: &str, summary: &str, location: Option<&str>) -> Value {
    let mut doc = json!({
        "id": id,
        "summary": summary,
        "start": { "dateTime": "2026-03-14T09:00:00Z" },
        "end": { "dateTime": "2026-03-14T10:00:00Z" },
    });
    if let Some(location) = location {
        doc["location"] = json!(location);
    }
    doc
}

#[tokio::test]
async fn created_event_round_trips_through_the_wire() {
    let h = harness();
    let scope = ScopeId::default();

    let start = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
    let mut pending = CalendarEvent::new(start, end).unwrap();
    pending.set_summary("architecture review").unwrap();
    pending.set_location("Room 4").unwrap();
    pending.add_attendee(Attendee::new("alice@example.com").unwrap());
    pending.add_attendee(Attendee::new("bob@example.com").unwrap());

    let created = h.calendar.create_event(&scope, &pending).await.unwrap();
    assert!(created.id().is_some());
    assert!(created.html_link().is_some());

    let fetched = h
        .calendar
        .get_event(&scope, created.id().unwrap().clone())
        .await
        .unwrap();
    assert_eq!(fetched, created);
    assert_eq!(
        fetched.attendee_emails(),
        vec!["alice@example.com", "bob@example.com"]
    );
    assert_eq!(fetched.duration(), Some(60));
}

#[tokio::test]
async fn query_splits_server_params_from_client_filters() {
    let h = harness();
    let scope = "team@example.com";
    h.remote
        .seed_event(scope, "e1", event_doc("e1", "standup", Some("Room 1")));
    h.remote
        .seed_event(scope, "e2", event_doc("e2", "standup", None));
    h.remote
        .seed_event(scope, "e3", event_doc("e3", "planning", Some("Room 2")));
    h.remote
        .seed_event(scope, "e4", event_doc("e4", "standup", Some("Room 3")));

    let events = h
        .calendar
        .query()
        .limit(50)
        .unwrap()
        .search("standup")
        .unwrap()
        .scope(scope)
        .with_location()
        .execute()
        .await
        .unwrap();

    // Server saw the supported constraints.
    let calls = h.remote.list_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, scope);
    assert_eq!(calls[0].1, Some(50));
    assert_eq!(calls[0].2.as_deref(), Some("standup"));
    drop(calls);

    // Client-side filter narrowed in order without reordering.
    let ids: Vec<_> = events
        .iter()
        .map(|e| e.id().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["e1", "e4"]);
}

#[tokio::test]
async fn first_on_an_empty_scope_is_none() {
    let h = harness();
    let first = h
        .calendar
        .query()
        .scope("empty@example.com")
        .first()
        .await
        .unwrap();
    assert!(first.is_none());
    assert!(!h
        .calendar
        .query()
        .scope("empty@example.com")
        .exists()
        .await
        .unwrap());
}

#[tokio::test]
async fn collect_all_batch_keeps_input_order_despite_latency() {
    let h = harness();
    let scope = ScopeId::default();
    h.remote
        .seed_event("primary", "slow", event_doc("slow", "first", None));
    h.remote
        .seed_event("primary", "fast-a", event_doc("fast-a", "second", None));
    h.remote
        .seed_event("primary", "fast-b", event_doc("fast-b", "third", None));
    h.remote.slow_ids.lock().unwrap().push("slow".to_string());

    let outcomes = h
        .calendar
        .batch_get(
            &scope,
            vec![
                EventId::from("slow"),
                EventId::from("fast-a"),
                EventId::from("fast-b"),
            ],
            BatchPolicy::CollectAll,
        )
        .await
        .unwrap();

    let summaries: Vec<_> = outcomes
        .into_iter()
        .map(|o| o.success().unwrap().summary().unwrap().to_string())
        .collect();
    assert_eq!(summaries, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn fail_fast_batch_reports_the_lowest_failing_index() {
    let h = harness();
    let scope = ScopeId::default();
    h.remote
        .seed_event("primary", "a", event_doc("a", "ok", None));
    h.remote
        .seed_event("primary", "c", event_doc("c", "ok", None));

    let err = h
        .calendar
        .batch_get(
            &scope,
            vec![EventId::from("a"), EventId::from("b"), EventId::from("c")],
            BatchPolicy::FailFast,
        )
        .await
        .unwrap_err();

    match err {
        ApiError::Batch { index, source } => {
            assert_eq!(index, 1);
            assert!(matches!(*source, ApiError::NotFound { .. }));
        }
        other => panic!("expected a batch error, got {other}"),
    }
}

#[tokio::test]
async fn expired_session_refreshes_once_and_retries() {
    let h = harness();
    let scope = ScopeId::default();
    h.remote
        .seed_event("primary", "e1", event_doc("e1", "standup", None));
    h.remote.expired.store(true, Ordering::SeqCst);

    let event = h
        .calendar
        .get_event(&scope, EventId::from("e1"))
        .await
        .unwrap();
    assert_eq!(event.summary(), Some("standup"));
    assert_eq!(h.provider.refreshes.load(Ordering::SeqCst), 1);

    // Subsequent calls reuse the refreshed session without another refresh.
    h.calendar
        .get_event(&scope, EventId::from("e1"))
        .await
        .unwrap();
    assert_eq!(h.provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_retry_surfaces_the_retry_error_directly() {
    let h = harness();
    let scope = ScopeId::default();
    h.remote.expired.store(true, Ordering::SeqCst);
    h.remote.deny_all.store(true, Ordering::SeqCst);

    let err = h
        .calendar
        .get_event(&scope, EventId::from("e1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Permission { status: 403, .. }));
    assert_eq!(h.provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deleting_a_recurring_instance_can_remove_the_series() {
    let h = harness();
    let scope = ScopeId::default();
    let mut instance = event_doc("inst-1", "weekly sync", None);
    instance["recurringEventId"] = json!("series-1");
    h.remote.seed_event("primary", "inst-1", instance);
    h.remote
        .seed_event("primary", "series-1", event_doc("series-1", "weekly sync", None));

    h.calendar
        .delete_event(&scope, EventId::from("inst-1"), true)
        .await
        .unwrap();

    let events = h.remote.events.lock().unwrap();
    assert!(!events.contains_key("primary:series-1"));
    // The instance entry is untouched; the series deletion covers it.
    assert!(events.contains_key("primary:inst-1"));
}

#[tokio::test]
async fn mark_read_flips_state_only_after_the_confirmed_mutation() {
    let h = harness();
    let scope = ScopeId::default();
    h.remote.seed_message(
        "primary",
        "m-1",
        json!({
            "id": "m-1",
            "threadId": "t-1",
            "labelIds": ["INBOX", "UNREAD"],
            "payload": { "headers": [{ "name": "From", "value": "alice@example.com" }] }
        }),
    );

    let before = h
        .mail
        .get_message(&scope, MessageId::from("m-1"))
        .await
        .unwrap();
    assert!(!before.is_read);

    let after = h
        .mail
        .mark_read(&scope, MessageId::from("m-1"))
        .await
        .unwrap();
    assert!(after.is_read);
    assert!(!after.has_label(&LabelId::from("UNREAD")));

    let fetched = h
        .mail
        .get_message(&scope, MessageId::from("m-1"))
        .await
        .unwrap();
    assert!(fetched.is_read);
}

#[tokio::test]
async fn unread_query_restricts_server_side() {
    let h = harness();
    let scope = ScopeId::default();
    h.remote.seed_message(
        "primary",
        "m-1",
        json!({ "id": "m-1", "threadId": "t-1", "labelIds": ["INBOX", "UNREAD"] }),
    );
    h.remote.seed_message(
        "primary",
        "m-2",
        json!({ "id": "m-2", "threadId": "t-1", "labelIds": ["INBOX"] }),
    );

    let unread = h.mail.query().scope(scope).unread_only().execute().await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, MessageId::from("m-1"));
    assert!(!unread[0].is_read);
}
