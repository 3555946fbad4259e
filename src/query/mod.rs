//! Fluent, validated queries over the remote listings.
//!
//! A query is built synchronously with set-time validation (a bad limit or
//! range never reaches the network), then executed asynchronously. Execution
//! pages through the remote listing one bridge round trip at a time, decodes
//! the items, and applies client-side post-filters in declaration order.
//! Post-filters only narrow: they preserve relative order and never add
//! items. A query is reusable; every `execute` call re-runs it.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::client::Connection;
use crate::codec::{EntityCodec, EventCodec, MessageCodec};
use crate::domain::{CalendarEvent, LabelId, ScopeId};
use crate::error::{ApiError, ApiResult};
use crate::remote::{Collection, ListParams, RawDocument};

/// Server limit applied when none is set.
pub const DEFAULT_LIMIT: usize = 100;
/// Largest server limit the service accepts.
pub const MAX_LIMIT: usize = 2500;
/// Longest accepted free-text search expression, in characters.
pub const MAX_TEXT_LENGTH: usize = 500;

/// Query over calendar events.
pub type EventQuery = Query<EventCodec>;
/// Query over mail messages.
pub type MessageQuery = Query<MessageCodec>;

struct QueryCore {
    limit: usize,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    text: Option<String>,
    scope: ScopeId,
}

/// A reusable, validated listing query for one entity type.
pub struct Query<C: EntityCodec> {
    connection: Connection,
    codec: C,
    collection: Collection,
    core: QueryCore,
    label_ids: Vec<LabelId>,
    filters: Vec<Box<dyn Fn(&C::Entity) -> bool + Send + Sync>>,
}

impl<C: EntityCodec> Query<C> {
    pub(crate) fn new(connection: Connection, codec: C, collection: Collection) -> Self {
        Self {
            connection,
            codec,
            collection,
            core: QueryCore {
                limit: DEFAULT_LIMIT,
                start: None,
                end: None,
                text: None,
                scope: ScopeId::default(),
            },
            label_ids: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Caps how many items the server returns, in `[1, 2500]`.
    pub fn limit(mut self, limit: usize) -> ApiResult<Self> {
        if limit < 1 || limit > MAX_LIMIT {
            return Err(ApiError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {limit}"
            )));
        }
        self.core.limit = limit;
        Ok(self)
    }

    /// Restricts to items whose primary timestamp falls in `[start, end)`.
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> ApiResult<Self> {
        if start >= end {
            return Err(ApiError::validation(
                "range start must be before range end",
            ));
        }
        self.core.start = Some(start);
        self.core.end = Some(end);
        Ok(self)
    }

    /// Adds a free-text search expression (at most 500 characters).
    pub fn search(mut self, text: impl Into<String>) -> ApiResult<Self> {
        let text = text.into();
        if text.chars().count() > MAX_TEXT_LENGTH {
            return Err(ApiError::validation(format!(
                "search text cannot exceed {MAX_TEXT_LENGTH} characters"
            )));
        }
        self.core.text = Some(text);
        Ok(self)
    }

    /// Targets a scope other than the default `"primary"`.
    pub fn scope(mut self, scope: impl Into<ScopeId>) -> Self {
        self.core.scope = scope.into();
        self
    }

    /// Today, midnight to midnight UTC.
    pub fn today(self) -> ApiResult<Self> {
        self.day_span(Utc::now().date_naive(), 1)
    }

    /// Tomorrow, midnight to midnight UTC.
    pub fn tomorrow(self) -> ApiResult<Self> {
        let tomorrow = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(1))
            .ok_or_else(date_overflow)?;
        self.day_span(tomorrow, 1)
    }

    /// The current Monday-to-Sunday week.
    pub fn this_week(self) -> ApiResult<Self> {
        let today = Utc::now().date_naive();
        let monday = today
            .checked_sub_days(Days::new(u64::from(today.weekday().num_days_from_monday())))
            .ok_or_else(date_overflow)?;
        self.day_span(monday, 7)
    }

    /// The current calendar month.
    pub fn this_month(self) -> ApiResult<Self> {
        let today = Utc::now().date_naive();
        let first = today.with_day(1).ok_or_else(date_overflow)?;
        let (year, month) = if today.month() == 12 {
            (today.year() + 1, 1)
        } else {
            (today.year(), today.month() + 1)
        };
        let next_first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(date_overflow)?;
        self.between(start_of_day(first)?, start_of_day(next_first)?)
    }

    /// From now until `days` days ahead; `days` must be positive.
    pub fn next_days(self, days: i64) -> ApiResult<Self> {
        if days <= 0 {
            return Err(ApiError::validation("day count must be positive"));
        }
        let now = Utc::now();
        let end = chrono::Duration::try_days(days)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(date_overflow)?;
        self.between(now, end)
    }

    /// From `days` days ago until now; `days` must be positive.
    pub fn last_days(self, days: i64) -> ApiResult<Self> {
        if days <= 0 {
            return Err(ApiError::validation("day count must be positive"));
        }
        let now = Utc::now();
        let start = chrono::Duration::try_days(days)
            .and_then(|d| now.checked_sub_signed(d))
            .ok_or_else(date_overflow)?;
        self.between(start, now)
    }

    /// Adds a custom post-filter, applied after the already-declared ones.
    pub fn matching(
        mut self,
        predicate: impl Fn(&C::Entity) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Runs the query: pages through the listing, decodes, post-filters.
    ///
    /// Items the server sends but the codec cannot interpret are skipped
    /// with a warning; they never abort the listing.
    pub async fn execute(&self) -> ApiResult<Vec<C::Entity>> {
        let items = self.fetch(&self.core.scope, self.core.limit).await?;
        Ok(self.post_filter(items))
    }

    /// Number of matching items; counts a full `execute`, not a server-side
    /// aggregate.
    pub async fn count(&self) -> ApiResult<usize> {
        Ok(self.execute().await?.len())
    }

    /// First matching item, fetching at most one from the server.
    ///
    /// Because post-filters run client-side, a single fetched item they
    /// reject yields `None` even if a later item would have matched.
    pub async fn first(&self) -> ApiResult<Option<C::Entity>> {
        let items = self.fetch(&self.core.scope, 1).await?;
        Ok(self.post_filter(items).into_iter().next())
    }

    /// Whether at least one item matches; same fetch behavior as `first`.
    pub async fn exists(&self) -> ApiResult<bool> {
        Ok(self.first().await?.is_some())
    }

    /// Runs the full query once per scope, concurrently.
    ///
    /// Fail-fast: the first scope to fail fails the whole call with that
    /// scope's error.
    pub async fn execute_across_scopes(
        &self,
        scopes: &[ScopeId],
    ) -> ApiResult<HashMap<ScopeId, Vec<C::Entity>>> {
        let runs = scopes.iter().map(|scope| async move {
            let items = self.fetch(scope, self.core.limit).await?;
            Ok::<_, ApiError>((scope.clone(), self.post_filter(items)))
        });
        let pairs = futures::future::try_join_all(runs).await?;
        Ok(pairs.into_iter().collect())
    }

    fn day_span(self, from: NaiveDate, days: u64) -> ApiResult<Self> {
        let until = from
            .checked_add_days(Days::new(days))
            .ok_or_else(date_overflow)?;
        self.between(start_of_day(from)?, start_of_day(until)?)
    }

    async fn fetch(&self, scope: &ScopeId, server_limit: usize) -> ApiResult<Vec<C::Entity>> {
        let mut raw: Vec<RawDocument> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let params = ListParams {
                limit: Some(server_limit),
                time_min: self.core.start,
                time_max: self.core.end,
                text: self.core.text.clone(),
                label_ids: self.label_ids.clone(),
                page_token: page_token.clone(),
            };
            let collection = self.collection;
            let page = self
                .connection
                .call(scope.clone(), move |remote, handle| {
                    remote.list(handle, collection, &params)
                })
                .await?;

            let page_empty = page.items.is_empty();
            raw.extend(page.items);
            // A server that repeats the same token with an empty page would
            // otherwise keep this loop spinning forever.
            if page_empty && page.next_page_token.is_some() && page.next_page_token == page_token
            {
                tracing::warn!(
                    scope = %scope,
                    "empty page with an unchanged continuation token; stopping the listing"
                );
                break;
            }
            page_token = page.next_page_token;
            if page_token.is_none() || raw.len() >= server_limit {
                break;
            }
        }
        raw.truncate(server_limit);

        let mut entities = Vec::with_capacity(raw.len());
        for doc in &raw {
            match self.codec.decode(doc) {
                Ok(entity) => entities.push(entity),
                Err(err) => {
                    tracing::warn!(scope = %scope, error = %err, "skipping undecodable listing item")
                }
            }
        }
        Ok(entities)
    }

    fn post_filter(&self, items: Vec<C::Entity>) -> Vec<C::Entity> {
        if self.filters.is_empty() {
            return items;
        }
        items
            .into_iter()
            .filter(|item| self.filters.iter().all(|keep| keep(item)))
            .collect()
    }
}

impl Query<EventCodec> {
    /// Keeps events that have the given email on the invite.
    pub fn by_attendee(self, email: impl Into<String>) -> Self {
        let email = email.into();
        self.matching(move |event: &CalendarEvent| event.has_attendee(&email))
    }

    /// Keeps events with a non-empty location.
    pub fn with_location(self) -> Self {
        self.matching(|event: &CalendarEvent| event.location().is_some_and(|l| !l.is_empty()))
    }

    /// Keeps events with no location.
    pub fn without_location(self) -> Self {
        self.matching(|event: &CalendarEvent| event.location().map_or(true, |l| l.is_empty()))
    }
}

impl Query<MessageCodec> {
    /// Restricts to messages carrying the given label (evaluated server-side).
    pub fn with_label(mut self, label: impl Into<LabelId>) -> Self {
        self.label_ids.push(label.into());
        self
    }

    /// Restricts to unread messages.
    pub fn unread_only(self) -> Self {
        self.with_label("UNREAD")
    }
}

fn start_of_day(date: NaiveDate) -> ApiResult<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(date_overflow)?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

fn date_overflow() -> ApiError {
    ApiError::Internal("date arithmetic out of range".to_string())
}
