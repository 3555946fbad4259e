//! Calendar event codec.
//!
//! Handles both timed events (`start.dateTime`) and all-day events
//! (`start.date`, rendered at midnight UTC). Attendee entries without a
//! syntactically valid email are skipped with a warning rather than failing
//! the whole event.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::{required_str, str_field, EntityCodec};
use crate::domain::{is_valid_email, Attendee, CalendarEvent, EventId, ResponseStatus};
use crate::error::{ApiError, ApiResult};
use crate::remote::RawDocument;

/// Codec for [`CalendarEvent`] documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCodec;

impl EntityCodec for EventCodec {
    type Entity = CalendarEvent;

    fn decode(&self, doc: &RawDocument) -> ApiResult<CalendarEvent> {
        let id = required_str(doc, "id", "event")?;

        let attendees = doc
            .get("attendees")
            .and_then(|v| v.as_array())
            .map(|entries| decode_attendees(entries))
            .unwrap_or_default();

        let recurrence = doc
            .get("recurrence")
            .and_then(|v| v.as_array())
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|r| r.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        CalendarEvent::hydrate(
            Some(EventId::from(id)),
            str_field(doc, "summary").map(String::from),
            str_field(doc, "description").map(String::from),
            str_field(doc, "location").map(String::from),
            decode_endpoint(doc.get("start"))?,
            decode_endpoint(doc.get("end"))?,
            str_field(doc, "htmlLink").map(String::from),
            attendees,
            recurrence,
            str_field(doc, "recurringEventId").map(EventId::from),
        )
        .map_err(|e| ApiError::decode(format!("event document violates invariants: {e}")))
    }

    fn encode(&self, event: &CalendarEvent) -> RawDocument {
        let mut doc = Map::new();
        if let Some(id) = event.id() {
            doc.insert("id".into(), json!(id.to_string()));
        }
        if let Some(summary) = event.summary() {
            doc.insert("summary".into(), json!(summary));
        }
        if let Some(description) = event.description() {
            doc.insert("description".into(), json!(description));
        }
        if let Some(location) = event.location() {
            doc.insert("location".into(), json!(location));
        }
        if let Some(start) = event.start() {
            doc.insert("start".into(), encode_endpoint(start));
        }
        if let Some(end) = event.end() {
            doc.insert("end".into(), encode_endpoint(end));
        }
        if let Some(link) = event.html_link() {
            doc.insert("htmlLink".into(), json!(link));
        }
        if !event.attendees().is_empty() {
            let attendees: Vec<Value> = event.attendees().iter().map(encode_attendee).collect();
            doc.insert("attendees".into(), Value::Array(attendees));
        }
        if !event.recurrence().is_empty() {
            doc.insert("recurrence".into(), json!(event.recurrence()));
        }
        if let Some(series) = event.recurring_event_id() {
            doc.insert("recurringEventId".into(), json!(series.to_string()));
        }
        Value::Object(doc)
    }
}

fn decode_attendees(entries: &[Value]) -> Vec<Attendee> {
    entries
        .iter()
        .filter_map(|entry| {
            let email = str_field(entry, "email")?;
            if !is_valid_email(email) {
                tracing::warn!(%email, "skipping attendee with malformed email");
                return None;
            }
            Attendee::with_details(
                email,
                str_field(entry, "displayName").map(String::from),
                str_field(entry, "responseStatus").and_then(ResponseStatus::from_wire),
            )
            .ok()
        })
        .collect()
}

fn encode_attendee(attendee: &Attendee) -> Value {
    let mut entry = Map::new();
    entry.insert("email".into(), json!(attendee.email()));
    if let Some(name) = attendee.display_name() {
        entry.insert("displayName".into(), json!(name));
    }
    if let Some(status) = attendee.response_status() {
        entry.insert("responseStatus".into(), json!(status.as_wire()));
    }
    Value::Object(entry)
}

fn decode_endpoint(value: Option<&Value>) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if let Some(stamp) = str_field(value, "dateTime") {
        let parsed = DateTime::parse_from_rfc3339(stamp)
            .map_err(|e| ApiError::decode(format!("invalid event timestamp {stamp}: {e}")))?;
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    if let Some(day) = str_field(value, "date") {
        let parsed = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| ApiError::decode(format!("invalid event date {day}: {e}")))?;
        let midnight = parsed
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ApiError::decode(format!("invalid event date {day}")))?;
        return Ok(Some(DateTime::from_naive_utc_and_offset(midnight, Utc)));
    }
    Ok(None)
}

fn encode_endpoint(stamp: DateTime<Utc>) -> Value {
    json!({ "dateTime": stamp.to_rfc3339_opts(SecondsFormat::Secs, true) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_doc() -> RawDocument {
        json!({
            "id": "ev-1",
            "summary": "Sprint review",
            "location": "Room 4",
            "start": { "dateTime": "2026-03-14T09:00:00Z" },
            "end": { "dateTime": "2026-03-14T10:00:00Z" },
            "htmlLink": "https://calendar.example.com/ev-1",
            "attendees": [
                { "email": "a@example.com", "responseStatus": "accepted" },
                { "email": "not-an-email" },
                { "email": "b@example.com", "displayName": "Bee" }
            ],
            "recurrence": ["RRULE:FREQ=WEEKLY"],
            "recurringEventId": "series-1"
        })
    }

    #[test]
    fn decodes_a_full_document() {
        let event = EventCodec.decode(&sample_doc()).unwrap();
        assert_eq!(event.id(), Some(&EventId::from("ev-1")));
        assert_eq!(event.summary(), Some("Sprint review"));
        assert_eq!(
            event.start(),
            Some(Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap())
        );
        assert_eq!(event.duration(), Some(60));
        // The malformed attendee entry is skipped, order preserved otherwise.
        assert_eq!(event.attendee_emails(), vec!["a@example.com", "b@example.com"]);
        assert_eq!(
            event.attendees()[0].response_status(),
            Some(ResponseStatus::Accepted)
        );
        assert_eq!(event.recurrence(), ["RRULE:FREQ=WEEKLY"]);
        assert_eq!(event.recurring_event_id(), Some(&EventId::from("series-1")));
    }

    #[test]
    fn decodes_all_day_dates_at_midnight_utc() {
        let doc = json!({
            "id": "ev-2",
            "start": { "date": "2026-03-14" },
            "end": { "date": "2026-03-15" }
        });
        let event = EventCodec.decode(&doc).unwrap();
        assert_eq!(
            event.start(),
            Some(Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn missing_id_is_a_decode_error() {
        let err = EventCodec.decode(&json!({"summary": "x"})).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn malformed_timestamp_is_a_decode_error() {
        let doc = json!({
            "id": "ev-3",
            "start": { "dateTime": "yesterday-ish" }
        });
        assert!(matches!(
            EventCodec.decode(&doc).unwrap_err(),
            ApiError::Decode(_)
        ));
    }

    #[test]
    fn inverted_range_in_document_is_a_decode_error() {
        let doc = json!({
            "id": "ev-4",
            "start": { "dateTime": "2026-03-14T10:00:00Z" },
            "end": { "dateTime": "2026-03-14T09:00:00Z" }
        });
        assert!(matches!(
            EventCodec.decode(&doc).unwrap_err(),
            ApiError::Decode(_)
        ));
    }

    #[test]
    fn round_trips_through_encode() {
        let event = EventCodec.decode(&sample_doc()).unwrap();
        let encoded = EventCodec.encode(&event);
        let again = EventCodec.decode(&encoded).unwrap();
        assert_eq!(event, again);
    }

    #[test]
    fn encodes_a_pending_event_without_id() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let mut event = CalendarEvent::new(start, end).unwrap();
        event.set_summary("standup").unwrap();

        let doc = EventCodec.encode(&event);
        assert!(doc.get("id").is_none());
        assert_eq!(doc["summary"], "standup");
        assert_eq!(doc["start"]["dateTime"], "2026-03-14T09:00:00Z");
    }
}
