//! Inbound webhook processing: tenant resolution and ownership classification.
//!
//! A webhook either belongs to this system or it does not. Foreign traffic
//! (unknown location, no matching lead) is acknowledged and discarded. Only
//! rule violations are rejected: attempts to overwrite a bound event id, or
//! events whose slot type cannot be determined. Silently accepting those
//! would corrupt ownership.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::envelope::EventEnvelope;
use crate::error::SyncResult;
use crate::lead::{Lead, SlotKind};
use crate::locks::SyncLocks;
use crate::store::{LeadStore, SlotPatch};
use crate::tenant::Tenant;
use crate::timezone::utc_to_local;

/// Why a webhook was acknowledged without any mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MissingEventId,
    MissingLocationId,
    MissingContactId,
    UnknownTenant,
    AmbiguousTenant,
    SuspendedTenant,
    NoMatchingLead,
    /// Another sync for this lead holds the lock; the webhook is dropped,
    /// not queued. The external side retries or the next trigger converges.
    SyncInFlight,
    /// Within the cooldown window of this slot's last sync; almost certainly
    /// the webhook echo of our own outbound write.
    Echo,
    NoOp,
}

impl IgnoreReason {
    pub fn message(&self) -> &'static str {
        match self {
            IgnoreReason::MissingEventId => "no event id in payload",
            IgnoreReason::MissingLocationId => "no location id in payload",
            IgnoreReason::MissingContactId => "no contact id in payload",
            IgnoreReason::UnknownTenant => "location does not belong to this system",
            IgnoreReason::AmbiguousTenant => "location matches more than one tenant",
            IgnoreReason::SuspendedTenant => "tenant is suspended",
            IgnoreReason::NoMatchingLead => "no lead for this contact",
            IgnoreReason::SyncInFlight => "sync already running for this lead",
            IgnoreReason::Echo => "duplicate sync ignored (cooldown period)",
            IgnoreReason::NoOp => "no change to apply",
        }
    }
}

/// Machine-readable rule-violation codes (HTTP 4xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    SlotOccupied,
    EventIdMismatch,
    NoEventIdStored,
    TypeUndetermined,
}

#[derive(Debug, Clone)]
pub struct RuleViolation {
    pub code: RejectCode,
    pub message: String,
}

/// Mutation applied by an accepted webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundAction {
    /// CREATE: a new event id was bound to a free slot.
    Bound,
    Updated,
    Cancelled,
}

/// Terminal decision for one inbound webhook.
#[derive(Debug)]
pub enum WebhookOutcome {
    Ignored(IgnoreReason),
    Applied {
        lead_id: Uuid,
        slot: SlotKind,
        action: InboundAction,
    },
    Rejected(RuleViolation),
}

/// The inbound half of the sync engine. Shares the lead-tier sync locks with
/// the reconciler so a webhook mutation and an outbound run never interleave
/// on the same lead.
pub struct WebhookPipeline<S> {
    store: Arc<S>,
    locks: SyncLocks,
    cooldown: chrono::Duration,
}

impl<S: LeadStore> WebhookPipeline<S> {
    pub fn new(store: Arc<S>, locks: SyncLocks, cooldown: chrono::Duration) -> Self {
        WebhookPipeline {
            store,
            locks,
            cooldown,
        }
    }

    pub async fn handle(&self, payload: &Value) -> SyncResult<WebhookOutcome> {
        self.handle_at(payload, Utc::now()).await
    }

    /// `now` is injectable so cooldown behavior is testable.
    pub async fn handle_at(&self, payload: &Value, now: DateTime<Utc>) -> SyncResult<WebhookOutcome> {
        let envelope = EventEnvelope::from_payload(payload);

        let Some(event_id) = envelope.event_id.clone() else {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::MissingEventId));
        };
        let Some(location_id) = envelope.location_id.clone() else {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::MissingLocationId));
        };
        let Some(contact_id) = envelope.contact_id.clone() else {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::MissingContactId));
        };

        // A missing tenant is not an error: shared webhook endpoints see
        // plenty of traffic for locations this system does not own.
        let mut tenants = self.store.tenants_by_location(&location_id).await?;
        let tenant = match tenants.len() {
            0 => return Ok(WebhookOutcome::Ignored(IgnoreReason::UnknownTenant)),
            1 => tenants.remove(0),
            _ => return Ok(WebhookOutcome::Ignored(IgnoreReason::AmbiguousTenant)),
        };
        if tenant.suspended {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::SuspendedTenant));
        }

        let bound = self
            .store
            .lead_by_event(tenant.id, &event_id, &contact_id)
            .await?;

        let Some(kind) = resolve_slot_kind(&tenant, &envelope, bound.as_ref(), &event_id) else {
            return Ok(WebhookOutcome::Rejected(RuleViolation {
                code: RejectCode::TypeUndetermined,
                message: format!("cannot determine slot type for event {event_id}"),
            }));
        };

        match bound {
            Some(lead) => {
                let Some(_guard) = self.locks.acquire_lead(lead.id) else {
                    return Ok(WebhookOutcome::Ignored(IgnoreReason::SyncInFlight));
                };
                // Re-read now that the lock is held; the pre-lock copy may
                // be stale.
                let lead = self.store.lead(lead.id).await?;
                self.apply_update(&tenant, lead, kind, &event_id, &envelope, now)
                    .await
            }
            None => self.apply_create(&tenant, kind, &event_id, &contact_id, &envelope, now).await,
        }
    }

    /// UPDATE: the event id is already bound somewhere on this lead. The
    /// type-appropriate slot must hold exactly this id for the update to land.
    async fn apply_update(
        &self,
        tenant: &Tenant,
        lead: Lead,
        kind: SlotKind,
        event_id: &str,
        envelope: &EventEnvelope,
        now: DateTime<Utc>,
    ) -> SyncResult<WebhookOutcome> {
        let slot = lead.slot(kind);

        match slot.event_id.as_deref() {
            None => {
                return Ok(WebhookOutcome::Rejected(RuleViolation {
                    code: RejectCode::NoEventIdStored,
                    message: format!("no event id stored for {} slot", kind.as_str()),
                }));
            }
            Some(stored) if stored != event_id => {
                return Ok(WebhookOutcome::Rejected(RuleViolation {
                    code: RejectCode::EventIdMismatch,
                    message: format!(
                        "event {event_id} does not own the {} slot",
                        kind.as_str()
                    ),
                }));
            }
            Some(_) => {}
        }

        // Cancellations always go through; only updates are candidates for
        // echo suppression.
        if envelope.is_cancellation() {
            self.store
                .write_slot(lead.id, kind, SlotPatch::cleared())
                .await?;
            tracing::info!(lead = %lead.id, slot = kind.as_str(), "slot cleared from webhook");
            return Ok(WebhookOutcome::Applied {
                lead_id: lead.id,
                slot: kind,
                action: InboundAction::Cancelled,
            });
        }

        if slot.within_cooldown(self.cooldown, now) {
            tracing::info!(lead = %lead.id, slot = kind.as_str(), "webhook echo suppressed");
            return Ok(WebhookOutcome::Ignored(IgnoreReason::Echo));
        }

        // Not a cancellation, so a start time is present.
        let start = envelope
            .start_time
            .ok_or(crate::error::SyncError::MissingField("startTime"))?;
        let (date, hhmm) = utc_to_local(start, tenant.timezone);
        let time = match kind {
            SlotKind::Appointment => Some(hhmm),
            SlotKind::Install => None,
        };

        if slot.date == Some(date) && slot.time == time && slot.last_synced_date == Some(date) {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::NoOp));
        }

        self.store
            .write_slot(
                lead.id,
                kind,
                SlotPatch {
                    date: Some(date),
                    time: time.clone(),
                    event_id: Some(event_id.to_string()),
                    last_synced_date: Some(date),
                    last_synced_time: time,
                    last_synced_at: Some(now),
                },
            )
            .await?;

        tracing::info!(lead = %lead.id, slot = kind.as_str(), %date, "slot updated from webhook");
        Ok(WebhookOutcome::Applied {
            lead_id: lead.id,
            slot: kind,
            action: InboundAction::Updated,
        })
    }

    /// CREATE: no lead references this event id yet. Bind it to the contact's
    /// lead, unless the slot already belongs to another event.
    async fn apply_create(
        &self,
        tenant: &Tenant,
        kind: SlotKind,
        event_id: &str,
        contact_id: &str,
        envelope: &EventEnvelope,
        now: DateTime<Utc>,
    ) -> SyncResult<WebhookOutcome> {
        let Some(lead) = self.store.lead_by_contact(tenant.id, contact_id).await? else {
            // Calendar-originated events never create leads.
            return Ok(WebhookOutcome::Ignored(IgnoreReason::NoMatchingLead));
        };

        if envelope.is_cancellation() {
            // Cancellation of an event we never bound.
            return Ok(WebhookOutcome::Ignored(IgnoreReason::NoOp));
        }

        // The occupancy check and the binding write must not interleave with
        // another acquirer; re-read the lead once the lock is held.
        let Some(_guard) = self.locks.acquire_lead(lead.id) else {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::SyncInFlight));
        };
        let lead = self.store.lead(lead.id).await?;

        if let Some(existing) = lead.slot(kind).event_id.as_deref() {
            return Ok(WebhookOutcome::Rejected(RuleViolation {
                code: RejectCode::SlotOccupied,
                message: format!(
                    "{} slot already bound to event {existing}",
                    kind.as_str()
                ),
            }));
        }

        let start = envelope
            .start_time
            .ok_or(crate::error::SyncError::MissingField("startTime"))?;
        let (date, hhmm) = utc_to_local(start, tenant.timezone);
        let time = match kind {
            SlotKind::Appointment => Some(hhmm),
            SlotKind::Install => None,
        };

        self.store
            .write_slot(
                lead.id,
                kind,
                SlotPatch {
                    date: Some(date),
                    time: time.clone(),
                    event_id: Some(event_id.to_string()),
                    last_synced_date: Some(date),
                    last_synced_time: time,
                    last_synced_at: Some(now),
                },
            )
            .await?;

        tracing::info!(lead = %lead.id, slot = kind.as_str(), %date, "event bound from webhook");
        Ok(WebhookOutcome::Applied {
            lead_id: lead.id,
            slot: kind,
            action: InboundAction::Bound,
        })
    }
}

/// Resolve which slot an inbound event targets: configured calendar id first,
/// then display-name keywords, then a reverse lookup of which slot already
/// holds the event id.
fn resolve_slot_kind(
    tenant: &Tenant,
    envelope: &EventEnvelope,
    bound: Option<&Lead>,
    event_id: &str,
) -> Option<SlotKind> {
    if let Some(calendar_id) = envelope.calendar_id.as_deref()
        && let Some(kind) = tenant.slot_for_calendar(calendar_id)
    {
        return Some(kind);
    }

    if let Some(name) = envelope.calendar_name.as_deref() {
        let name = name.to_ascii_lowercase();
        if name.contains("appointment") || name.contains("appt") || name.contains("sales") {
            return Some(SlotKind::Appointment);
        }
        if name.contains("install") {
            return Some(SlotKind::Install);
        }
    }

    if let Some(lead) = bound {
        if lead.appointment.event_id.as_deref() == Some(event_id) {
            return Some(SlotKind::Appointment);
        }
        if lead.install.event_id.as_deref() == Some(event_id) {
            return Some(SlotKind::Install);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::Slot;
    use crate::store::MemoryStore;
    use crate::tenant::CalendarConfig;
    use chrono::NaiveDate;
    use serde_json::json;

    const COOLDOWN: chrono::Duration = chrono::Duration::minutes(2);

    fn tenant() -> Tenant {
        let mut tenant = Tenant::new("Acme Coatings", "loc_1", chrono_tz::America::New_York);
        tenant.appointment_calendar = Some(CalendarConfig {
            calendar_id: "cal_appt".into(),
            assigned_user: None,
            title_template: None,
            description_template: None,
        });
        tenant.install_calendar = Some(CalendarConfig {
            calendar_id: "cal_install".into(),
            assigned_user: None,
            title_template: None,
            description_template: None,
        });
        tenant
    }

    fn pipeline(store: Arc<MemoryStore>) -> WebhookPipeline<MemoryStore> {
        WebhookPipeline::new(store, SyncLocks::in_memory(), COOLDOWN)
    }

    fn lead_for(tenant: &Tenant, contact: &str) -> Lead {
        let mut lead = Lead::new(tenant.id, "Ann", "Lee");
        lead.contact_id = Some(contact.to_string());
        lead
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn unknown_location_is_acknowledged_and_discarded() {
        let store = Arc::new(MemoryStore::new());
        let outcome = pipeline(store)
            .handle(&json!({
                "eventId": "E1", "contactId": "ct_1", "locationId": "loc_x",
                "startTime": "2025-01-10T19:00:00Z"
            }))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Ignored(IgnoreReason::UnknownTenant)
        ));
    }

    #[tokio::test]
    async fn ambiguous_location_is_discarded_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        store.insert_tenant(tenant());
        store.insert_tenant(tenant()); // second tenant on the same location id
        let outcome = pipeline(Arc::clone(&store))
            .handle(&json!({
                "eventId": "E1", "contactId": "ct_1", "locationId": "loc_1",
                "startTime": "2025-01-10T19:00:00Z"
            }))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Ignored(IgnoreReason::AmbiguousTenant)
        ));
    }

    #[tokio::test]
    async fn create_binds_event_to_free_slot_in_tenant_local_time() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let lead = lead_for(&tenant, "ct_1");
        let lead_id = lead.id;
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let outcome = pipeline(Arc::clone(&store))
            .handle(&json!({
                "eventId": "E1", "contactId": "ct_1", "locationId": "loc_1",
                "calendarId": "cal_appt",
                "startTime": "2025-01-10T19:00:00Z"
            }))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Applied { action: InboundAction::Bound, slot: SlotKind::Appointment, .. }
        ));

        let lead = store.lead(lead_id).await.unwrap();
        assert_eq!(lead.appointment.event_id.as_deref(), Some("E1"));
        // 19:00 UTC is 14:00 in New York in January.
        assert_eq!(lead.appointment.date, Some(d("2025-01-10")));
        assert_eq!(lead.appointment.time.as_deref(), Some("14:00"));
        assert_eq!(lead.appointment.last_synced_date, Some(d("2025-01-10")));
        assert!(lead.appointment.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn create_for_unknown_contact_never_creates_a_lead() {
        let store = Arc::new(MemoryStore::new());
        store.insert_tenant(tenant());

        let outcome = pipeline(Arc::clone(&store))
            .handle(&json!({
                "eventId": "E1", "contactId": "ct_missing", "locationId": "loc_1",
                "calendarId": "cal_appt",
                "startTime": "2025-01-10T19:00:00Z"
            }))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Ignored(IgnoreReason::NoMatchingLead)
        ));
        assert!(store.all_leads().is_empty());
    }

    #[tokio::test]
    async fn occupied_slot_rejects_instead_of_overwriting() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        lead.appointment.event_id = Some("E1".into());
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let outcome = pipeline(Arc::clone(&store))
            .handle(&json!({
                "eventId": "E2", "contactId": "ct_1", "locationId": "loc_1",
                "calendarId": "cal_appt",
                "startTime": "2025-01-10T19:00:00Z"
            }))
            .await
            .unwrap();

        match outcome {
            WebhookOutcome::Rejected(v) => assert_eq!(v.code, RejectCode::SlotOccupied),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cross_slot_event_id_is_rejected_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        // E1 owns the install slot; an appointment-calendar webhook for E1
        // must not touch the appointment slot.
        lead.install = Slot {
            date: Some(d("2025-02-01")),
            event_id: Some("E1".into()),
            ..Slot::default()
        };
        let lead_id = lead.id;
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let outcome = pipeline(Arc::clone(&store))
            .handle(&json!({
                "eventId": "E1", "contactId": "ct_1", "locationId": "loc_1",
                "calendarId": "cal_appt",
                "startTime": "2025-01-10T19:00:00Z"
            }))
            .await
            .unwrap();

        match outcome {
            WebhookOutcome::Rejected(v) => assert_eq!(v.code, RejectCode::NoEventIdStored),
            other => panic!("expected rejection, got {other:?}"),
        }
        let lead = store.lead(lead_id).await.unwrap();
        assert!(lead.appointment.date.is_none());
        assert_eq!(lead.install.event_id.as_deref(), Some("E1"));
    }

    #[tokio::test]
    async fn update_with_wrong_event_id_is_event_id_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        lead.appointment = Slot {
            date: Some(d("2025-01-10")),
            time: Some("14:00".into()),
            event_id: Some("E1".into()),
            ..Slot::default()
        };
        lead.install = Slot {
            date: Some(d("2025-02-01")),
            event_id: Some("E2".into()),
            ..Slot::default()
        };
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        // E2 is bound (install slot) but the calendar says appointment, and
        // the appointment slot is owned by E1.
        let outcome = pipeline(Arc::clone(&store))
            .handle(&json!({
                "eventId": "E2", "contactId": "ct_1", "locationId": "loc_1",
                "calendarId": "cal_appt",
                "startTime": "2025-01-11T19:00:00Z"
            }))
            .await
            .unwrap();

        match outcome {
            WebhookOutcome::Rejected(v) => assert_eq!(v.code, RejectCode::EventIdMismatch),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn echo_within_cooldown_is_suppressed() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        let now = Utc::now();
        lead.appointment = Slot {
            date: Some(d("2025-01-10")),
            time: Some("14:00".into()),
            event_id: Some("E1".into()),
            last_synced_date: Some(d("2025-01-10")),
            last_synced_time: Some("14:00".into()),
            last_synced_at: Some(now - chrono::Duration::seconds(20)),
            tentative: false,
        };
        let lead_id = lead.id;
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let outcome = pipeline(Arc::clone(&store))
            .handle_at(
                &json!({
                    "eventId": "E1", "contactId": "ct_1", "locationId": "loc_1",
                    "calendarId": "cal_appt",
                    "startTime": "2025-01-10T20:00:00Z"
                }),
                now,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Ignored(IgnoreReason::Echo)
        ));
        // The (stale) inbound time was not applied.
        let lead = store.lead(lead_id).await.unwrap();
        assert_eq!(lead.appointment.time.as_deref(), Some("14:00"));
    }

    #[tokio::test]
    async fn update_after_cooldown_applies_new_time() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        let now = Utc::now();
        lead.appointment = Slot {
            date: Some(d("2025-01-10")),
            time: Some("14:00".into()),
            event_id: Some("E1".into()),
            last_synced_date: Some(d("2025-01-10")),
            last_synced_time: Some("14:00".into()),
            last_synced_at: Some(now - chrono::Duration::minutes(10)),
            tentative: false,
        };
        let lead_id = lead.id;
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let outcome = pipeline(Arc::clone(&store))
            .handle_at(
                &json!({
                    "eventId": "E1", "contactId": "ct_1", "locationId": "loc_1",
                    "calendarId": "cal_appt",
                    "startTime": "2025-01-10T20:30:00Z"
                }),
                now,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Applied { action: InboundAction::Updated, .. }
        ));
        let lead = store.lead(lead_id).await.unwrap();
        assert_eq!(lead.appointment.time.as_deref(), Some("15:30"));
        assert_eq!(lead.appointment.last_synced_time.as_deref(), Some("15:30"));
    }

    #[tokio::test]
    async fn locked_lead_drops_webhook_without_binding() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let lead = lead_for(&tenant, "ct_1");
        let lead_id = lead.id;
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let locks = SyncLocks::in_memory();
        let pipeline = WebhookPipeline::new(Arc::clone(&store), locks.clone(), COOLDOWN);
        let payload = json!({
            "eventId": "E1", "contactId": "ct_1", "locationId": "loc_1",
            "calendarId": "cal_appt",
            "startTime": "2025-01-10T19:00:00Z"
        });

        // While another sync holds the lead lock, the binding must not happen.
        let held = locks.acquire_lead(lead_id).expect("lock free");
        let outcome = pipeline.handle(&payload).await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Ignored(IgnoreReason::SyncInFlight)
        ));
        assert_eq!(store.lead(lead_id).await.unwrap().appointment.event_id, None);

        drop(held);
        let outcome = pipeline.handle(&payload).await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Applied { action: InboundAction::Bound, .. }
        ));
        // A second binding attempt for the now-occupied slot still rejects.
        let outcome = pipeline
            .handle(&json!({
                "eventId": "E2", "contactId": "ct_1", "locationId": "loc_1",
                "calendarId": "cal_appt",
                "startTime": "2025-01-10T20:00:00Z"
            }))
            .await
            .unwrap();
        match outcome {
            WebhookOutcome::Rejected(v) => assert_eq!(v.code, RejectCode::SlotOccupied),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(
            store.lead(lead_id).await.unwrap().appointment.event_id.as_deref(),
            Some("E1")
        );
    }

    #[tokio::test]
    async fn cancellation_within_cooldown_still_goes_through() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        let now = Utc::now();
        lead.install = Slot {
            date: Some(d("2025-02-01")),
            event_id: Some("E2".into()),
            last_synced_date: Some(d("2025-02-01")),
            last_synced_at: Some(now - chrono::Duration::seconds(10)),
            ..Slot::default()
        };
        let lead_id = lead.id;
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let outcome = pipeline(Arc::clone(&store))
            .handle_at(
                &json!({
                    "eventId": "E2", "contactId": "ct_1", "locationId": "loc_1",
                    "calendarId": "cal_install",
                    "status": "cancelled"
                }),
                now,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Applied { action: InboundAction::Cancelled, .. }
        ));
        assert_eq!(store.lead(lead_id).await.unwrap().install, Slot::default());
    }

    #[tokio::test]
    async fn matching_local_time_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        let now = Utc::now();
        lead.appointment = Slot {
            date: Some(d("2025-01-10")),
            time: Some("14:00".into()),
            event_id: Some("E1".into()),
            last_synced_date: Some(d("2025-01-10")),
            last_synced_time: Some("14:00".into()),
            last_synced_at: Some(now - chrono::Duration::minutes(10)),
            tentative: false,
        };
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        // 19:00 UTC converts back to the stored 14:00 New York wall clock.
        let outcome = pipeline(Arc::clone(&store))
            .handle_at(
                &json!({
                    "eventId": "E1", "contactId": "ct_1", "locationId": "loc_1",
                    "calendarId": "cal_appt",
                    "startTime": "2025-01-10T19:00:00Z"
                }),
                now,
            )
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored(IgnoreReason::NoOp)));
    }

    #[tokio::test]
    async fn cancellation_clears_slot_fields_together() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        let now = Utc::now();
        lead.install = Slot {
            date: Some(d("2025-02-01")),
            event_id: Some("E2".into()),
            last_synced_date: Some(d("2025-02-01")),
            last_synced_at: Some(now - chrono::Duration::minutes(10)),
            ..Slot::default()
        };
        let lead_id = lead.id;
        store.insert_tenant(tenant);
        store.insert_lead(lead);

        let outcome = pipeline(Arc::clone(&store))
            .handle_at(
                &json!({
                    "eventId": "E2", "contactId": "ct_1", "locationId": "loc_1",
                    "calendarId": "cal_install",
                    "status": "cancelled"
                }),
                now,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Applied { action: InboundAction::Cancelled, slot: SlotKind::Install, .. }
        ));
        let lead = store.lead(lead_id).await.unwrap();
        assert_eq!(lead.install, Slot::default());
    }

    #[tokio::test]
    async fn slot_kind_falls_back_to_name_keywords_then_reverse_lookup() {
        let store = Arc::new(MemoryStore::new());
        let tenant = tenant();
        let mut lead = lead_for(&tenant, "ct_1");
        lead.install = Slot {
            date: Some(d("2025-02-01")),
            event_id: Some("E7".into()),
            last_synced_date: Some(d("2025-02-01")),
            ..Slot::default()
        };
        store.insert_tenant(tenant.clone());
        store.insert_lead(lead);

        // Unknown calendar id, name says "Sales Visits" -> appointment.
        let env = EventEnvelope::from_payload(&json!({
            "calendarId": "cal_other", "calendarName": "Sales Visits"
        }));
        assert_eq!(
            resolve_slot_kind(&tenant, &env, None, "E9"),
            Some(SlotKind::Appointment)
        );

        // No calendar hints at all: fall back to whichever slot holds the id.
        let env = EventEnvelope::from_payload(&json!({}));
        let bound = store.lead_by_event(tenant.id, "E7", "ct_1").await.unwrap();
        assert_eq!(
            resolve_slot_kind(&tenant, &env, bound.as_ref(), "E7"),
            Some(SlotKind::Install)
        );

        // Nothing resolves -> undetermined.
        assert_eq!(resolve_slot_kind(&tenant, &env, None, "E9"), None);
    }
}
