//! Calendar event domain types.
//!
//! [`CalendarEvent`] validates its invariants at construction and at every
//! mutating setter, so an invalid intermediate state is never observable
//! between construction and a later synchronize-to-remote call. Mutations are
//! local only; pushing them to the remote service is always an explicit
//! [`CalendarClient::update_event`](crate::client::CalendarClient::update_event)
//! step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventId;
use crate::error::{ApiError, ApiResult};

/// Maximum length of an event summary.
pub const MAX_SUMMARY_LENGTH: usize = 1024;
/// Maximum length of an event description.
pub const MAX_DESCRIPTION_LENGTH: usize = 8192;
/// Maximum length of an event location.
pub const MAX_LOCATION_LENGTH: usize = 1024;

/// Syntactic email validation: non-empty local part, one `@`, dotted domain.
///
/// Deliberately loose; the remote service is the authority on deliverability.
pub(crate) fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((head, tail)) = domain.rsplit_once('.') else {
        return false;
    };
    !head.is_empty() && tail.len() >= 2 && !domain.contains(char::is_whitespace)
}

/// An attendee's reply state on an invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    /// No reply yet.
    NeedsAction,
    /// Declined the invite.
    Declined,
    /// Tentatively accepted.
    Tentative,
    /// Accepted the invite.
    Accepted,
}

impl ResponseStatus {
    /// Parses the remote service's wire string.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "needsAction" => Some(Self::NeedsAction),
            "declined" => Some(Self::Declined),
            "tentative" => Some(Self::Tentative),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }

    /// Returns the wire string for this status.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::NeedsAction => "needsAction",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
            Self::Accepted => "accepted",
        }
    }
}

/// An event attendee. Immutable value object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    email: String,
    display_name: Option<String>,
    response_status: Option<ResponseStatus>,
}

impl Attendee {
    /// Creates an attendee with just an email address.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] if the email is empty or not
    /// syntactically valid.
    pub fn new(email: impl Into<String>) -> ApiResult<Self> {
        Self::with_details(email, None, None)
    }

    /// Creates an attendee with an optional display name and response status.
    pub fn with_details(
        email: impl Into<String>,
        display_name: Option<String>,
        response_status: Option<ResponseStatus>,
    ) -> ApiResult<Self> {
        let email = email.into();
        if email.is_empty() {
            return Err(ApiError::validation("attendee email cannot be empty"));
        }
        if !is_valid_email(&email) {
            return Err(ApiError::validation(format!(
                "invalid email format: {email}"
            )));
        }
        Ok(Self {
            email,
            display_name,
            response_status,
        })
    }

    /// The attendee's email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The attendee's display name, if known.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// The attendee's reply state, if known.
    pub fn response_status(&self) -> Option<ResponseStatus> {
        self.response_status
    }
}

/// A calendar event.
///
/// Constructed locally (pending, no id) via [`CalendarEvent::new`], or
/// hydrated from a remote document by the event codec (has an id). Attendee
/// order is insertion order, which mirrors invite order.
///
/// Instances are plain values: callers must not mutate one instance from two
/// concurrent operations.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    id: Option<EventId>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    html_link: Option<String>,
    attendees: Vec<Attendee>,
    recurrence: Vec<String>,
    recurring_event_id: Option<EventId>,
}

fn validate_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> ApiResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(ApiError::validation(
                "event start time must be before end time",
            ));
        }
    }
    Ok(())
}

fn validate_text(value: Option<&str>, max: usize, field: &str) -> ApiResult<()> {
    if let Some(value) = value {
        if value.chars().count() > max {
            return Err(ApiError::validation(format!(
                "event {field} cannot exceed {max} characters"
            )));
        }
    }
    Ok(())
}

impl CalendarEvent {
    /// Creates a pending (not yet synchronized) event.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ApiResult<Self> {
        validate_range(Some(start), Some(end))?;
        Ok(Self {
            id: None,
            summary: None,
            description: None,
            location: None,
            start: Some(start),
            end: Some(end),
            html_link: None,
            attendees: Vec::new(),
            recurrence: Vec::new(),
            recurring_event_id: None,
        })
    }

    /// Builds an event from already-decoded remote parts.
    ///
    /// Used by the codec when hydrating a server document; applies the same
    /// invariants as local construction.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn hydrate(
        id: Option<EventId>,
        summary: Option<String>,
        description: Option<String>,
        location: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        html_link: Option<String>,
        attendees: Vec<Attendee>,
        recurrence: Vec<String>,
        recurring_event_id: Option<EventId>,
    ) -> ApiResult<Self> {
        validate_range(start, end)?;
        validate_text(summary.as_deref(), MAX_SUMMARY_LENGTH, "summary")?;
        validate_text(description.as_deref(), MAX_DESCRIPTION_LENGTH, "description")?;
        validate_text(location.as_deref(), MAX_LOCATION_LENGTH, "location")?;
        Ok(Self {
            id,
            summary,
            description,
            location,
            start,
            end,
            html_link,
            attendees,
            recurrence,
            recurring_event_id,
        })
    }

    /// Server-assigned id; `None` while the event is pending.
    pub fn id(&self) -> Option<&EventId> {
        self.id.as_ref()
    }

    /// Short title of the event.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Long-form description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Physical or virtual location.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Start timestamp.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// End timestamp.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Server-assigned browser link.
    pub fn html_link(&self) -> Option<&str> {
        self.html_link.as_deref()
    }

    /// Attendees in invite order.
    pub fn attendees(&self) -> &[Attendee] {
        &self.attendees
    }

    /// Recurrence rules (RFC 5545 strings) in declaration order.
    pub fn recurrence(&self) -> &[String] {
        &self.recurrence
    }

    /// Id of the recurring series this instance belongs to, if any.
    pub fn recurring_event_id(&self) -> Option<&EventId> {
        self.recurring_event_id.as_ref()
    }

    /// Updates the summary.
    pub fn set_summary(&mut self, summary: impl Into<String>) -> ApiResult<()> {
        let summary = summary.into();
        validate_text(Some(&summary), MAX_SUMMARY_LENGTH, "summary")?;
        self.summary = Some(summary);
        Ok(())
    }

    /// Updates the description.
    pub fn set_description(&mut self, description: impl Into<String>) -> ApiResult<()> {
        let description = description.into();
        validate_text(Some(&description), MAX_DESCRIPTION_LENGTH, "description")?;
        self.description = Some(description);
        Ok(())
    }

    /// Updates the location.
    pub fn set_location(&mut self, location: impl Into<String>) -> ApiResult<()> {
        let location = location.into();
        validate_text(Some(&location), MAX_LOCATION_LENGTH, "location")?;
        self.location = Some(location);
        Ok(())
    }

    /// Moves the start time, keeping `start < end`.
    pub fn set_start(&mut self, start: DateTime<Utc>) -> ApiResult<()> {
        validate_range(Some(start), self.end)?;
        self.start = Some(start);
        Ok(())
    }

    /// Moves the end time, keeping `start < end`.
    pub fn set_end(&mut self, end: DateTime<Utc>) -> ApiResult<()> {
        validate_range(self.start, Some(end))?;
        self.end = Some(end);
        Ok(())
    }

    /// Replaces the recurrence rules.
    pub fn set_recurrence(&mut self, recurrence: Vec<String>) {
        self.recurrence = recurrence;
    }

    /// Appends an attendee; a duplicate email is a no-op.
    pub fn add_attendee(&mut self, attendee: Attendee) {
        if !self.has_attendee(attendee.email()) {
            self.attendees.push(attendee);
        }
    }

    /// Removes the attendee with the given email, if present.
    pub fn remove_attendee(&mut self, email: &str) {
        self.attendees.retain(|a| a.email() != email);
    }

    /// Event length in whole minutes, when both endpoints are present.
    pub fn duration(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }

    /// Whether the event ended before `now`.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| end < now)
    }

    /// Whether the event starts after `now`.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.start.is_some_and(|start| start > now)
    }

    /// Whether `now` falls inside the event.
    pub fn is_happening_at(&self, now: DateTime<Utc>) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= now && now <= end,
            _ => false,
        }
    }

    /// Whether this event overlaps another in time.
    pub fn conflicts_with(&self, other: &CalendarEvent) -> bool {
        match (self.start, self.end, other.start, other.end) {
            (Some(s1), Some(e1), Some(s2), Some(e2)) => s1 < e2 && e1 > s2,
            _ => false,
        }
    }

    /// Whether an attendee with the given email is on the invite.
    pub fn has_attendee(&self, email: &str) -> bool {
        self.attendees.iter().any(|a| a.email() == email)
    }

    /// Attendee emails in invite order.
    pub fn attendee_emails(&self) -> Vec<&str> {
        self.attendees.iter().map(|a| a.email()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap()
    }

    #[test]
    fn attendee_requires_valid_email() {
        assert!(Attendee::new("alice@example.com").is_ok());
        assert!(matches!(Attendee::new(""), Err(ApiError::Validation(_))));
        assert!(matches!(
            Attendee::new("not-an-email"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            Attendee::new("alice@nodot"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn response_status_wire_round_trip() {
        for status in [
            ResponseStatus::NeedsAction,
            ResponseStatus::Declined,
            ResponseStatus::Tentative,
            ResponseStatus::Accepted,
        ] {
            assert_eq!(ResponseStatus::from_wire(status.as_wire()), Some(status));
        }
        assert_eq!(ResponseStatus::from_wire("maybe"), None);
    }

    #[test]
    fn event_rejects_inverted_range() {
        assert!(matches!(
            CalendarEvent::new(at(10), at(9)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            CalendarEvent::new(at(10), at(10)),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn duration_is_whole_minutes() {
        let event = CalendarEvent::new(at(9), at(11)).unwrap();
        assert_eq!(event.duration(), Some(120));
    }

    #[test]
    fn setters_keep_range_invariant() {
        let mut event = CalendarEvent::new(at(9), at(10)).unwrap();
        assert!(matches!(
            event.set_start(at(11)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(event.set_end(at(8)), Err(ApiError::Validation(_))));
        // Failed setters leave the event untouched.
        assert_eq!(event.start(), Some(at(9)));
        assert_eq!(event.end(), Some(at(10)));

        event.set_end(at(12)).unwrap();
        assert_eq!(event.duration(), Some(180));
    }

    #[test]
    fn summary_length_is_bounded() {
        let mut event = CalendarEvent::new(at(9), at(10)).unwrap();
        assert!(event.set_summary("standup").is_ok());
        let too_long = "x".repeat(MAX_SUMMARY_LENGTH + 1);
        assert!(matches!(
            event.set_summary(too_long),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn attendees_keep_invite_order_and_dedupe() {
        let mut event = CalendarEvent::new(at(9), at(10)).unwrap();
        event.add_attendee(Attendee::new("a@example.com").unwrap());
        event.add_attendee(Attendee::new("b@example.com").unwrap());
        event.add_attendee(Attendee::new("a@example.com").unwrap());

        assert_eq!(event.attendee_emails(), vec!["a@example.com", "b@example.com"]);
        assert!(event.has_attendee("b@example.com"));

        event.remove_attendee("a@example.com");
        assert_eq!(event.attendee_emails(), vec!["b@example.com"]);
    }

    #[test]
    fn conflict_detection_is_overlap() {
        let a = CalendarEvent::new(at(9), at(11)).unwrap();
        let b = CalendarEvent::new(at(10), at(12)).unwrap();
        let c = CalendarEvent::new(at(11), at(12)).unwrap();
        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&c)); // back-to-back is not a conflict
    }

    #[test]
    fn time_queries() {
        let event = CalendarEvent::new(at(9), at(10)).unwrap();
        assert!(event.is_past(at(11)));
        assert!(event.is_upcoming(at(8)));
        assert!(event.is_happening_at(at(9)));
        assert!(!event.is_happening_at(at(12)));
    }
}
