//! The lead record: the local unit of scheduling truth.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the two scheduling purposes tracked per lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Appointment,
    Install,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Appointment => "appointment",
            SlotKind::Install => "install",
        }
    }

    /// Tag applied when a calendar event for this slot is created/updated/cancelled.
    pub fn action_tag(&self, action: &str) -> String {
        match self {
            SlotKind::Appointment => format!("appt_date_{action}"),
            SlotKind::Install => format!("install_date_{action}"),
        }
    }

    /// Tag applied when this slot's sync fails.
    pub fn fail_tag(&self) -> &'static str {
        match self {
            SlotKind::Appointment => "appt_sync_fail",
            SlotKind::Install => "install_sync_fail",
        }
    }
}

/// Scheduling state for one slot, including the last-synced snapshot used
/// for change detection and echo suppression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub date: Option<NaiveDate>,
    /// Wall-clock time "HH:MM" in the tenant's timezone (appointment only).
    pub time: Option<String>,
    /// Externally-assigned calendar event id. Once bound, only explicit
    /// cancellation may clear it.
    pub event_id: Option<String>,
    /// Install only: the date is provisional and gets a staggered time slot.
    pub tentative: bool,
    pub last_synced_date: Option<NaiveDate>,
    pub last_synced_time: Option<String>,
    /// When the snapshot was last written by a successful sync (either
    /// direction). Drives the cooldown window.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Slot {
    /// Whether the most recent successful sync happened within `cooldown`.
    pub fn within_cooldown(&self, cooldown: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            Some(at) => now - at < cooldown,
            None => false,
        }
    }
}

/// Durable outcome of the last outbound sync attempt for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Success,
    Error,
}

/// Lead status, mirrored to the CRM as a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    PreLead,
    Lead,
    AppointmentSet,
    Sold,
    NotSold,
    Completed,
    Junk,
}

impl LeadStatus {
    /// CRM tag for this status (exact spelling matters to downstream automations).
    pub fn tag(&self) -> &'static str {
        match self {
            LeadStatus::PreLead => "status - pre-lead",
            LeadStatus::Lead => "status - lead",
            LeadStatus::AppointmentSet => "status - appointment set",
            LeadStatus::Sold => "status - sold",
            LeadStatus::NotSold => "status - not sold",
            LeadStatus::Completed => "status - complete",
            LeadStatus::Junk => "status - junk",
        }
    }

    /// Display label used in CRM custom fields.
    pub fn label(&self) -> &'static str {
        match self {
            LeadStatus::PreLead => "Pre-Lead",
            LeadStatus::Lead => "Lead",
            LeadStatus::AppointmentSet => "Appointment Set",
            LeadStatus::Sold => "Sold",
            LeadStatus::NotSold => "Not Sold",
            LeadStatus::Completed => "Completed",
            LeadStatus::Junk => "Junk",
        }
    }
}

/// Estimate data joined onto the lead for template rendering and CRM custom fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimateData {
    pub project_type: Option<String>,
    pub square_footage: Option<f64>,
    pub finish_type: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub condition: Option<String>,
}

/// A lead and its two scheduling slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// External CRM contact id, set on first successful contact upsert.
    pub contact_id: Option<String>,

    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,

    pub status: LeadStatus,
    pub lead_source: Option<String>,
    pub referral_source: Option<String>,
    pub notes: Option<String>,
    pub contract_price: Option<f64>,
    pub estimate: Option<EstimateData>,

    pub appointment: Slot,
    pub install: Slot,

    pub sync_status: SyncStatus,
    pub last_synced: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn new(tenant_id: Uuid, first_name: &str, last_name: &str) -> Self {
        Lead {
            id: Uuid::new_v4(),
            tenant_id,
            contact_id: None,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: None,
            phone: None,
            address: None,
            city: None,
            state: None,
            zip: None,
            status: LeadStatus::Lead,
            lead_source: None,
            referral_source: None,
            notes: None,
            contract_price: None,
            estimate: None,
            appointment: Slot::default(),
            install: Slot::default(),
            sync_status: SyncStatus::Pending,
            last_synced: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn slot(&self, kind: SlotKind) -> &Slot {
        match kind {
            SlotKind::Appointment => &self.appointment,
            SlotKind::Install => &self.install,
        }
    }

    pub fn slot_mut(&mut self, kind: SlotKind) -> &mut Slot {
        match kind {
            SlotKind::Appointment => &mut self.appointment,
            SlotKind::Install => &mut self.install,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Single-line address used on calendar events.
    pub fn address_line(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.address, &self.city, &self.state, &self.zip]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Normalize a US phone number into E.164.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.len() == 10 {
        Some(format!("+1{digits}"))
    } else if digits.len() == 11 && digits.starts_with('1') {
        Some(format!("+{digits}"))
    } else {
        Some(format!("+{digits}"))
    }
}
