//! Outbound reconciliation: push a lead's current scheduling state to the CRM.
//!
//! Desired state is always re-derived from the lead record, never carried
//! forward as a delta. A dropped trigger (lock contention, timeout, cooldown)
//! therefore loses nothing; the next trigger converges from current state.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::change::{ChangeKind, classify_slot, normalize_time};
use crate::crm::{ContactCreate, ContactWrite, CrmApi, CustomField, EventUpdate, EventWrite};
use crate::error::{SyncError, SyncResult};
use crate::lead::{Lead, SlotKind, SyncStatus, normalize_phone};
use crate::locks::SyncLocks;
use crate::store::{LeadStore, SlotPatch, SyncErrorRecord};
use crate::template::render;
use crate::tenant::Tenant;
use crate::timezone::{local_to_utc, parse_hhmm};

const APPOINTMENT_DURATION: Duration = Duration::hours(1);
const INSTALL_DURATION: Duration = Duration::hours(8);
const INSTALL_DAY_START: (u32, u32) = (8, 0);

/// What happened to one slot during a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotAction {
    Created { event_id: String },
    Updated,
    Deleted,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `none` or `unchanged` classification; includes the redundant-sync
    /// guard (current tuple equals the last-synced snapshot).
    NoChange,
    /// Within the cooldown window since the slot's last successful sync.
    Cooldown,
    /// Tenant has no calendar configured for this slot type.
    NotConfigured,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotReport {
    pub slot: SlotKind,
    pub action: SlotAction,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub contact_id: String,
    pub slots: Vec<SlotReport>,
    pub failed_slots: Vec<SlotKind>,
}

/// Explicit per-slot run context, threaded through the call chain instead of
/// mutating shared state on the lead.
#[derive(Clone, Copy)]
struct SlotRun<'a> {
    lead: &'a Lead,
    tenant: &'a Tenant,
    kind: SlotKind,
    contact_id: &'a str,
    now: DateTime<Utc>,
}

/// The outbound half of the sync engine.
pub struct Reconciler<S, C> {
    store: Arc<S>,
    api: Arc<C>,
    locks: SyncLocks,
    cooldown: Duration,
}

impl<S: LeadStore, C: CrmApi> Reconciler<S, C> {
    pub fn new(store: Arc<S>, api: Arc<C>, locks: SyncLocks, cooldown: Duration) -> Self {
        Reconciler {
            store,
            api,
            locks,
            cooldown,
        }
    }

    /// Reconcile one lead against the CRM. Returns `Ok(None)` when another
    /// reconciliation for the tenant or lead is already in flight; the
    /// trigger is dropped, not queued.
    pub async fn sync_lead(&self, lead_id: Uuid) -> SyncResult<Option<SyncReport>> {
        self.sync_lead_at(lead_id, Utc::now()).await
    }

    pub async fn sync_lead_at(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> SyncResult<Option<SyncReport>> {
        let lead = self.store.lead(lead_id).await?;
        let tenant = self.store.tenant(lead.tenant_id).await?;
        if tenant.suspended {
            tracing::info!(lead = %lead_id, tenant = %tenant.id, "tenant suspended, sync skipped");
            return Ok(None);
        }

        let Some(_tenant_guard) = self.locks.acquire_tenant(tenant.id) else {
            tracing::warn!(tenant = %tenant.id, "sync already running for tenant");
            return Ok(None);
        };
        let Some(_lead_guard) = self.locks.acquire_lead(lead.id) else {
            tracing::warn!(lead = %lead.id, "sync already running for lead");
            return Ok(None);
        };

        match self.run(&lead, &tenant, now).await {
            Ok(report) => {
                let status = if report.failed_slots.is_empty() {
                    SyncStatus::Success
                } else {
                    SyncStatus::Error
                };
                self.store.set_sync_status(lead.id, status).await?;
                Ok(Some(report))
            }
            Err(err) => {
                self.store
                    .record_error(SyncErrorRecord::new(
                        lead.id,
                        tenant.id,
                        "general_sync_fail",
                        &err.to_string(),
                        json!({ "lead_id": lead.id, "tenant_id": tenant.id }),
                    ))
                    .await?;
                self.store.set_sync_status(lead.id, SyncStatus::Error).await?;
                Err(err)
            }
        }
    }

    async fn run(&self, lead: &Lead, tenant: &Tenant, now: DateTime<Utc>) -> SyncResult<SyncReport> {
        // Contact upsert comes first: calendar events need the contact id.
        let write = contact_write(lead);
        let contact_id = match self.api.create_contact(tenant, &write).await? {
            ContactCreate::Created(id) => id,
            ContactCreate::Duplicate(id) => {
                self.api.update_contact(tenant, &id, &write).await?;
                id
            }
        };
        self.store.set_contact_id(lead.id, &contact_id).await?;

        if lead.estimate.is_some() {
            self.tag(tenant, &contact_id, "estimator_lead").await;
        }
        self.tag(tenant, &contact_id, lead.status.tag()).await;

        let mut report = SyncReport {
            contact_id: contact_id.clone(),
            slots: Vec::new(),
            failed_slots: Vec::new(),
        };

        // Fixed slot order; a failure in one slot never blocks the other.
        for kind in [SlotKind::Appointment, SlotKind::Install] {
            let run = SlotRun {
                lead,
                tenant,
                kind,
                contact_id: &contact_id,
                now,
            };
            match self.sync_slot(&run).await {
                Ok(action) => report.slots.push(SlotReport { slot: kind, action }),
                Err(err) => {
                    tracing::error!(
                        lead = %lead.id,
                        slot = kind.as_str(),
                        error = %err,
                        "slot sync failed"
                    );
                    let slot = lead.slot(kind);
                    self.store
                        .record_error(SyncErrorRecord::new(
                            lead.id,
                            tenant.id,
                            kind.fail_tag(),
                            &err.to_string(),
                            json!({
                                "date": slot.date,
                                "time": slot.time,
                                "tentative": slot.tentative,
                            }),
                        ))
                        .await?;
                    self.tag(tenant, &contact_id, kind.fail_tag()).await;
                    report.failed_slots.push(kind);
                }
            }
        }

        Ok(report)
    }

    async fn sync_slot(&self, run: &SlotRun<'_>) -> SyncResult<SlotAction> {
        let SlotRun {
            lead,
            tenant,
            kind,
            contact_id,
            now,
        } = *run;
        let slot = lead.slot(kind);

        let change = classify_slot(kind, slot);
        if !change.requires_sync() {
            return Ok(SlotAction::Skipped {
                reason: SkipReason::NoChange,
            });
        }
        // Cooldown only suppresses updates; creates and cancellations always
        // go through.
        if change == ChangeKind::Changed && slot.within_cooldown(self.cooldown, now) {
            tracing::info!(lead = %lead.id, slot = kind.as_str(), "cooldown, sync suppressed");
            return Ok(SlotAction::Skipped {
                reason: SkipReason::Cooldown,
            });
        }

        if change == ChangeKind::Cancelled {
            let event_id = slot
                .event_id
                .as_deref()
                .ok_or(SyncError::MissingField("event_id"))?;
            self.api.delete_event(tenant, event_id).await?;
            // Event id and snapshot are cleared together.
            self.store
                .write_slot(lead.id, kind, SlotPatch::cleared())
                .await?;
            self.tag(tenant, contact_id, &kind.action_tag("cancelled")).await;
            tracing::info!(lead = %lead.id, slot = kind.as_str(), "calendar event deleted");
            return Ok(SlotAction::Deleted);
        }

        // New or Changed from here on.
        let Some(calendar) = tenant.calendar(kind) else {
            return Ok(SlotAction::Skipped {
                reason: SkipReason::NotConfigured,
            });
        };
        let date = slot.date.ok_or(SyncError::MissingField("date"))?;

        let (start, end) = self.event_window(lead, tenant, kind, date).await?;
        let data = template_data(lead);
        let title = render(tenant.title_template(kind), &data);
        let notes = render(tenant.description_template(kind), &data);
        let address = lead.address_line();

        let normalized_time = match kind {
            SlotKind::Appointment => Some(
                slot.time
                    .as_deref()
                    .and_then(normalize_time)
                    .ok_or_else(|| SyncError::InvalidTime(format!("{:?}", slot.time)))?,
            ),
            SlotKind::Install => None,
        };

        if change == ChangeKind::Changed {
            let event_id = slot
                .event_id
                .clone()
                .ok_or(SyncError::MissingField("event_id"))?;
            self.api
                .update_event(
                    tenant,
                    &event_id,
                    &EventUpdate {
                        title,
                        start_time: start,
                        end_time: end,
                        address,
                    },
                )
                .await?;
            self.store
                .write_slot(
                    lead.id,
                    kind,
                    SlotPatch {
                        date: Some(date),
                        time: slot.time.clone(),
                        event_id: Some(event_id),
                        last_synced_date: Some(date),
                        last_synced_time: normalized_time,
                        last_synced_at: Some(now),
                    },
                )
                .await?;
            self.tag(tenant, contact_id, &kind.action_tag("updated")).await;
            tracing::info!(lead = %lead.id, slot = kind.as_str(), "calendar event updated");
            return Ok(SlotAction::Updated);
        }

        let event_id = self
            .api
            .create_event(
                tenant,
                &EventWrite {
                    location_id: tenant.location_id.clone(),
                    calendar_id: calendar.calendar_id.clone(),
                    contact_id: contact_id.to_string(),
                    title,
                    notes,
                    start_time: start,
                    end_time: end,
                    address,
                    assigned_user_id: calendar.assigned_user.clone(),
                },
            )
            .await?;
        self.store
            .write_slot(
                lead.id,
                kind,
                SlotPatch {
                    date: Some(date),
                    time: slot.time.clone(),
                    event_id: Some(event_id.clone()),
                    last_synced_date: Some(date),
                    last_synced_time: normalized_time,
                    last_synced_at: Some(now),
                },
            )
            .await?;
        self.tag(tenant, contact_id, &kind.action_tag("set")).await;
        if kind == SlotKind::Install && slot.tentative {
            self.tag(tenant, contact_id, "install_tentative").await;
        }
        tracing::info!(lead = %lead.id, slot = kind.as_str(), %event_id, "calendar event created");
        Ok(SlotAction::Created { event_id })
    }

    /// Compute the UTC event window for a slot.
    async fn event_window(
        &self,
        lead: &Lead,
        tenant: &Tenant,
        kind: SlotKind,
        date: NaiveDate,
    ) -> SyncResult<(DateTime<Utc>, DateTime<Utc>)> {
        match kind {
            SlotKind::Appointment => {
                let raw = lead
                    .appointment
                    .time
                    .as_deref()
                    .ok_or(SyncError::MissingField("appointment_time"))?;
                let time = normalize_time(raw)
                    .and_then(|t| parse_hhmm(&t))
                    .ok_or_else(|| SyncError::InvalidTime(raw.to_string()))?;
                let start = local_to_utc(date, time, tenant.timezone);
                Ok((start, start + APPOINTMENT_DURATION))
            }
            SlotKind::Install => {
                let time = if lead.install.tentative {
                    let offset = self
                        .store
                        .tentative_installs_before(tenant.id, week_start(date), lead.created_at)
                        .await?;
                    stagger_time(offset)
                } else {
                    let (h, m) = INSTALL_DAY_START;
                    NaiveTime::from_hms_opt(h, m, 0).expect("valid day start")
                };
                let start = local_to_utc(date, time, tenant.timezone);
                Ok((start, start + INSTALL_DURATION))
            }
        }
    }

    /// Tags are best-effort CRM metadata: failures are logged, never fatal.
    async fn tag(&self, tenant: &Tenant, contact_id: &str, tag: &str) {
        if let Err(err) = self.api.add_tags(tenant, contact_id, &[tag.to_string()]).await {
            tracing::warn!(%contact_id, tag, error = %err, "tag application failed");
        }
    }
}

/// Sunday-based start of the calendar week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Staggered start time for the nth tentative install of the week:
/// 30-minute increments from 08:00.
fn stagger_time(offset: u32) -> NaiveTime {
    let hour = (8 + offset / 2).min(23);
    let minute = (offset % 2) * 30;
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid stagger time")
}

/// Template input: the lead plus joined estimate data.
fn template_data(lead: &Lead) -> Value {
    json!({
        "id": lead.id,
        "full_name": lead.full_name(),
        "first_name": lead.first_name,
        "last_name": lead.last_name,
        "email": lead.email,
        "phone": lead.phone,
        "address": lead.address,
        "city": lead.city,
        "state": lead.state,
        "zip": lead.zip,
        "status": lead.status.label(),
        "notes": lead.notes,
        "contract_price": lead.contract_price,
        "estimate": lead.estimate.as_ref().map(|e| json!({
            "project_type": e.project_type,
            "square_footage": e.square_footage,
            "finish_type": e.finish_type,
            "price_min": e.price_min,
            "price_max": e.price_max,
            "condition": e.condition,
        })),
    })
}

/// Project a lead into the CRM contact payload.
fn contact_write(lead: &Lead) -> ContactWrite {
    let mut fields = Vec::new();
    let mut push = |id: &str, value: Value| {
        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        if !empty {
            fields.push(CustomField {
                id: id.to_string(),
                field_value: value,
            });
        }
    };

    push("ls_lead_id", json!(lead.id.to_string()));
    push("ls_tenant_id", json!(lead.tenant_id.to_string()));
    push("ls_lead_source", json!(lead.lead_source));
    push("ls_referral_source", json!(lead.referral_source));
    push("ls_created_date", json!(lead.created_at.format("%m-%d-%Y").to_string()));
    push("ls_lead_status", json!(lead.status.label()));
    push("ls_sync_status", json!(lead.sync_status));
    push("ls_notes", json!(lead.notes));
    push("ls_contract_price", json!(lead.contract_price));
    push("ls_install_tentative", json!(yes_no(lead.install.tentative)));

    if let Some(est) = &lead.estimate {
        push("est_project_type", json!(est.project_type));
        push("est_square_footage", json!(est.square_footage));
        push("est_finish_type", json!(est.finish_type));
        push("est_floor_condition", json!(est.condition));
        push("est_price_min", json!(est.price_min));
        push("est_price_max", json!(est.price_max));
    }

    ContactWrite {
        location_id: None,
        source: None,
        first_name: non_empty(&lead.first_name),
        last_name: non_empty(&lead.last_name),
        email: lead.email.clone(),
        phone: lead.phone.as_deref().and_then(normalize_phone),
        address1: lead.address.clone(),
        city: lead.city.clone(),
        state: lead.state.clone(),
        postal_code: lead.zip.clone(),
        country: "US".to_string(),
        custom_fields: fields,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}
