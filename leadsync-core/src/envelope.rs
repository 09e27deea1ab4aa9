//! Inbound webhook envelope normalization.
//!
//! External calendar webhooks arrive in several field-name shapes (flat or
//! nested under a `calendar`/`contact`/`location` object). This module is a
//! pure transform from an arbitrary JSON body to a canonical envelope, driven
//! by a declarative alias table evaluated in priority order. It never fails:
//! every field is independently optional and absence is represented as `None`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Canonical calendar-event envelope extracted from a webhook payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventEnvelope {
    pub event_id: Option<String>,
    pub calendar_id: Option<String>,
    pub calendar_name: Option<String>,
    pub contact_id: Option<String>,
    pub location_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Dotted-path aliases per field, highest priority first.
const EVENT_ID: &[&str] = &["id", "eventId", "appointment_id"];
const CALENDAR_ID: &[&str] = &["calendarId", "calendar_id", "calendar.id"];
const CALENDAR_NAME: &[&str] = &["calendarName", "calendar.name"];
const CONTACT_ID: &[&str] = &["contactId", "contact_id", "contact.id"];
const LOCATION_ID: &[&str] = &["locationId", "customData.locationId", "location.id"];
const START_TIME: &[&str] = &["startTime", "start_time", "appointmentStartTime"];
const END_TIME: &[&str] = &["endTime", "end_time"];
const STATUS: &[&str] = &["status", "appointmentStatus"];

impl EventEnvelope {
    pub fn from_payload(payload: &Value) -> Self {
        EventEnvelope {
            event_id: pick_string(payload, EVENT_ID),
            calendar_id: pick_string(payload, CALENDAR_ID),
            calendar_name: pick_string(payload, CALENDAR_NAME),
            contact_id: pick_string(payload, CONTACT_ID),
            location_id: pick_string(payload, LOCATION_ID),
            start_time: pick_datetime(payload, START_TIME),
            end_time: pick_datetime(payload, END_TIME),
            status: pick_string(payload, STATUS),
        }
    }

    /// An event with a cancelled status, or no start time at all, means the
    /// external side removed the booking.
    pub fn is_cancellation(&self) -> bool {
        match self.status.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("cancelled") || s.eq_ignore_ascii_case("canceled") => {
                true
            }
            _ => self.start_time.is_none(),
        }
    }
}

/// Descend a dotted path through nested JSON objects.
fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}

/// First alias whose value is usable, so an empty or malformed higher-priority
/// field never masks a usable lower-priority one.
fn pick_string(payload: &Value, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(usable_string)
}

fn pick_datetime(payload: &Value, aliases: &[&str]) -> Option<DateTime<Utc>> {
    aliases
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(|v| {
            let raw = usable_string(v)?;
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

fn usable_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_flat_shape() {
        let payload = json!({
            "eventId": "ev_1",
            "calendarId": "cal_1",
            "contactId": "ct_1",
            "locationId": "loc_1",
            "startTime": "2025-03-10T19:00:00Z",
            "status": "booked"
        });

        let env = EventEnvelope::from_payload(&payload);
        assert_eq!(env.event_id.as_deref(), Some("ev_1"));
        assert_eq!(env.calendar_id.as_deref(), Some("cal_1"));
        assert_eq!(env.contact_id.as_deref(), Some("ct_1"));
        assert_eq!(env.location_id.as_deref(), Some("loc_1"));
        assert!(env.start_time.is_some());
        assert!(!env.is_cancellation());
    }

    #[test]
    fn extracts_nested_shape() {
        let payload = json!({
            "id": "ev_2",
            "calendar": { "id": "cal_2", "name": "Install Crew" },
            "contact": { "id": "ct_2" },
            "customData": { "locationId": "loc_2" },
            "start_time": "2025-03-10T14:00:00-05:00"
        });

        let env = EventEnvelope::from_payload(&payload);
        assert_eq!(env.event_id.as_deref(), Some("ev_2"));
        assert_eq!(env.calendar_id.as_deref(), Some("cal_2"));
        assert_eq!(env.calendar_name.as_deref(), Some("Install Crew"));
        assert_eq!(env.contact_id.as_deref(), Some("ct_2"));
        assert_eq!(env.location_id.as_deref(), Some("loc_2"));
        assert_eq!(
            env.start_time.map(|t| t.to_rfc3339()),
            Some("2025-03-10T19:00:00+00:00".to_string())
        );
    }

    #[test]
    fn flat_id_takes_priority_over_nested() {
        let payload = json!({
            "calendarId": "cal_flat",
            "calendar": { "id": "cal_nested" }
        });
        let env = EventEnvelope::from_payload(&payload);
        assert_eq!(env.calendar_id.as_deref(), Some("cal_flat"));
    }

    #[test]
    fn empty_alias_falls_through_to_next() {
        let payload = json!({ "id": "", "eventId": "ev_1" });
        let env = EventEnvelope::from_payload(&payload);
        assert_eq!(env.event_id.as_deref(), Some("ev_1"));

        // A malformed higher-priority timestamp does not mask a usable one.
        let payload = json!({ "startTime": "soon", "start_time": "2025-01-10T19:00:00Z" });
        let env = EventEnvelope::from_payload(&payload);
        assert!(env.start_time.is_some());
    }

    #[test]
    fn missing_fields_are_none_not_errors() {
        let env = EventEnvelope::from_payload(&json!({}));
        assert!(env.event_id.is_none());
        assert!(env.location_id.is_none());
        // No start time means the booking no longer exists.
        assert!(env.is_cancellation());

        let env = EventEnvelope::from_payload(&json!({ "eventId": null, "contactId": "  " }));
        assert!(env.event_id.is_none());
        assert!(env.contact_id.is_none());
    }

    #[test]
    fn cancellation_status_spellings() {
        for status in ["cancelled", "canceled", "Cancelled"] {
            let payload = json!({ "status": status, "startTime": "2025-03-10T19:00:00Z" });
            assert!(EventEnvelope::from_payload(&payload).is_cancellation());
        }
        let payload = json!({ "status": "confirmed", "startTime": "2025-03-10T19:00:00Z" });
        assert!(!EventEnvelope::from_payload(&payload).is_cancellation());
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let payload = json!({ "id": 12345 });
        let env = EventEnvelope::from_payload(&payload);
        assert_eq!(env.event_id.as_deref(), Some("12345"));
    }
}
