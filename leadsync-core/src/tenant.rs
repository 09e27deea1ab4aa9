//! Tenant (company) calendar configuration.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lead::SlotKind;

/// Per-slot calendar configuration on a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub assigned_user: Option<String>,
    pub title_template: Option<String>,
    pub description_template: Option<String>,
}

/// A tenant owning one external CRM location and up to two calendars.
///
/// The external location id maps to at most one tenant; webhook processing
/// proceeds only when that resolution is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// External location identifier carried on inbound webhooks.
    pub location_id: String,
    /// Stored bearer credential, AES-GCM encrypted (raw value accepted
    /// as a fallback during key rotation).
    pub api_key: Option<String>,
    pub timezone: Tz,
    pub appointment_calendar: Option<CalendarConfig>,
    pub install_calendar: Option<CalendarConfig>,
    pub suspended: bool,
}

impl Tenant {
    pub fn new(name: &str, location_id: &str, timezone: Tz) -> Self {
        Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location_id: location_id.to_string(),
            api_key: None,
            timezone,
            appointment_calendar: None,
            install_calendar: None,
            suspended: false,
        }
    }

    pub fn calendar(&self, kind: SlotKind) -> Option<&CalendarConfig> {
        match kind {
            SlotKind::Appointment => self.appointment_calendar.as_ref(),
            SlotKind::Install => self.install_calendar.as_ref(),
        }
    }

    /// Which slot a calendar id belongs to, if it matches either configured calendar.
    pub fn slot_for_calendar(&self, calendar_id: &str) -> Option<SlotKind> {
        if self
            .appointment_calendar
            .as_ref()
            .is_some_and(|c| c.calendar_id == calendar_id)
        {
            return Some(SlotKind::Appointment);
        }
        if self
            .install_calendar
            .as_ref()
            .is_some_and(|c| c.calendar_id == calendar_id)
        {
            return Some(SlotKind::Install);
        }
        None
    }

    pub fn title_template(&self, kind: SlotKind) -> &str {
        let configured = self
            .calendar(kind)
            .and_then(|c| c.title_template.as_deref());
        match kind {
            SlotKind::Appointment => configured.unwrap_or("{{full_name}} - Appointment"),
            SlotKind::Install => configured.unwrap_or("{{full_name}} - Install"),
        }
    }

    pub fn description_template(&self, kind: SlotKind) -> &str {
        self.calendar(kind)
            .and_then(|c| c.description_template.as_deref())
            .unwrap_or("")
    }
}
