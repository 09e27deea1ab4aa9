//! Change detection: classify a slot's transition since its last sync.
//!
//! The classification is symmetric for inbound (webhook-driven) and outbound
//! (local-edit-driven) flows: it only looks at the slot's current value, its
//! bound event id, and the last-synced snapshot.

use crate::lead::{Slot, SlotKind};

/// Transition of a scheduling slot relative to its last-synced state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// No current value and no bound event id.
    None,
    /// Current value present, no event id bound yet.
    New,
    /// Current and prior values both present and differ.
    Changed,
    /// Both present and identical.
    Unchanged,
    /// Current value absent but a bound event id exists.
    Cancelled,
}

impl ChangeKind {
    /// Only these transitions trigger an outbound call.
    pub fn requires_sync(&self) -> bool {
        matches!(
            self,
            ChangeKind::New | ChangeKind::Changed | ChangeKind::Cancelled
        )
    }
}

/// Classify a slot. Appointments compare `(date, time)`; installs compare
/// date only (the tentative flag signals a separate confirmation transition,
/// see [`install_confirmed`]).
pub fn classify_slot(kind: SlotKind, slot: &Slot) -> ChangeKind {
    let has_current = match kind {
        SlotKind::Appointment => slot.date.is_some() && slot.time.is_some(),
        SlotKind::Install => slot.date.is_some(),
    };

    if !has_current {
        return if slot.event_id.is_some() {
            ChangeKind::Cancelled
        } else {
            ChangeKind::None
        };
    }

    if slot.event_id.is_none() {
        return ChangeKind::New;
    }

    let date_matches = slot.date == slot.last_synced_date;
    let time_matches = match kind {
        SlotKind::Appointment => {
            normalized(slot.time.as_deref()) == normalized(slot.last_synced_time.as_deref())
        }
        SlotKind::Install => true,
    };

    if date_matches && time_matches {
        ChangeKind::Unchanged
    } else {
        ChangeKind::Changed
    }
}

/// Tentative → confirmed transition for the install slot.
pub fn install_confirmed(previous_tentative: bool, current_tentative: bool) -> bool {
    previous_tentative && !current_tentative
}

fn normalized(time: Option<&str>) -> Option<String> {
    time.and_then(normalize_time)
}

/// Normalize a time value to 24-hour "HH:MM".
///
/// Accepts "HH:MM", "HH:MM:SS" (database TIME values) and "h[:mm] am/pm".
pub fn normalize_time(time: &str) -> Option<String> {
    let time = time.trim();

    // "14:00:00" -> "14:00"
    if let Some((h, rest)) = time.split_once(':') {
        let parts: Vec<&str> = rest.split(':').collect();
        if (parts.len() == 1 || parts.len() == 2)
            && h.chars().all(|c| c.is_ascii_digit())
            && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
        {
            let hour: u32 = h.parse().ok()?;
            let minute: u32 = parts[0].parse().ok()?;
            if hour < 24 && minute < 60 {
                return Some(format!("{hour:02}:{minute:02}"));
            }
        }
    }

    // "2 pm", "2:30 PM"
    let lower = time.to_ascii_lowercase();
    let (clock, meridian) = if let Some(stripped) = lower.strip_suffix("pm") {
        (stripped.trim(), Some("pm"))
    } else if let Some(stripped) = lower.strip_suffix("am") {
        (stripped.trim(), Some("am"))
    } else {
        return None;
    };

    let (hour_str, minute_str) = match clock.split_once(':') {
        Some((h, m)) => (h, m),
        None => (clock, "00"),
    };
    let mut hour: u32 = hour_str.trim().parse().ok()?;
    let minute: u32 = minute_str.trim().parse().ok()?;
    if hour == 0 || hour > 12 || minute >= 60 {
        return None;
    }
    match meridian {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    Some(format!("{hour:02}:{minute:02}"))
}
