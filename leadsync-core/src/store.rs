//! Persistence seam and the in-memory reference store.
//!
//! The relational store itself is an external collaborator; the engine only
//! depends on this narrow interface. `MemoryStore` backs single-instance
//! deployments and every test.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::lead::{Lead, SlotKind, SyncStatus};
use crate::tenant::Tenant;

/// Atomic replacement of a slot's scheduling state. The event id and the
/// snapshot it describes are always written together, so a partially-cleared
/// cancellation can never be observed.
#[derive(Debug, Clone, Default)]
pub struct SlotPatch {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub event_id: Option<String>,
    pub last_synced_date: Option<NaiveDate>,
    pub last_synced_time: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SlotPatch {
    /// Patch clearing every slot field (cancellation).
    pub fn cleared() -> Self {
        SlotPatch::default()
    }
}

/// Append-only failure record for later inspection.
#[derive(Debug, Clone, Serialize)]
pub struct SyncErrorRecord {
    pub lead_id: Uuid,
    pub tenant_id: Uuid,
    pub category: String,
    pub message: String,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

impl SyncErrorRecord {
    pub fn new(lead_id: Uuid, tenant_id: Uuid, category: &str, message: &str, payload: Value) -> Self {
        SyncErrorRecord {
            lead_id,
            tenant_id,
            category: category.to_string(),
            message: message.to_string(),
            payload,
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn tenant(&self, id: Uuid) -> SyncResult<Tenant>;

    /// Every tenant bound to an external location id. The caller treats
    /// anything other than exactly one match as "not ours".
    async fn tenants_by_location(&self, location_id: &str) -> SyncResult<Vec<Tenant>>;

    async fn lead(&self, id: Uuid) -> SyncResult<Lead>;

    /// The lead (if any) whose appointment or install slot is bound to this
    /// event id for this contact, within one tenant.
    async fn lead_by_event(
        &self,
        tenant_id: Uuid,
        event_id: &str,
        contact_id: &str,
    ) -> SyncResult<Option<Lead>>;

    async fn lead_by_contact(&self, tenant_id: Uuid, contact_id: &str)
    -> SyncResult<Option<Lead>>;

    /// Replace one slot's scheduling state in a single write.
    async fn write_slot(&self, lead_id: Uuid, kind: SlotKind, patch: SlotPatch) -> SyncResult<()>;

    async fn set_contact_id(&self, lead_id: Uuid, contact_id: &str) -> SyncResult<()>;

    async fn set_sync_status(&self, lead_id: Uuid, status: SyncStatus) -> SyncResult<()>;

    /// How many other tentative installs for this tenant fall in the calendar
    /// week starting at `week_start` and were created before `created_before`.
    /// Drives the staggered time-slot assignment.
    async fn tentative_installs_before(
        &self,
        tenant_id: Uuid,
        week_start: NaiveDate,
        created_before: DateTime<Utc>,
    ) -> SyncResult<u32>;

    async fn record_error(&self, record: SyncErrorRecord) -> SyncResult<()>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    tenants: RwLock<HashMap<Uuid, Tenant>>,
    leads: RwLock<HashMap<Uuid, Lead>>,
    errors: RwLock<Vec<SyncErrorRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants
            .write()
            .expect("tenant map poisoned")
            .insert(tenant.id, tenant);
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.leads
            .write()
            .expect("lead map poisoned")
            .insert(lead.id, lead);
    }

    /// Apply an edit to a stored lead (the local-edit origin of a sync).
    pub fn update_lead(&self, id: Uuid, edit: impl FnOnce(&mut Lead)) -> SyncResult<Lead> {
        let mut leads = self.leads.write().expect("lead map poisoned");
        let lead = leads.get_mut(&id).ok_or(SyncError::LeadNotFound(id))?;
        edit(lead);
        Ok(lead.clone())
    }

    pub fn error_log(&self) -> Vec<SyncErrorRecord> {
        self.errors.read().expect("error log poisoned").clone()
    }

    pub fn all_leads(&self) -> Vec<Lead> {
        self.leads
            .read()
            .expect("lead map poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn tenant(&self, id: Uuid) -> SyncResult<Tenant> {
        self.tenants
            .read()
            .expect("tenant map poisoned")
            .get(&id)
            .cloned()
            .ok_or(SyncError::TenantNotFound(id))
    }

    async fn tenants_by_location(&self, location_id: &str) -> SyncResult<Vec<Tenant>> {
        Ok(self
            .tenants
            .read()
            .expect("tenant map poisoned")
            .values()
            .filter(|t| t.location_id == location_id)
            .cloned()
            .collect())
    }

    async fn lead(&self, id: Uuid) -> SyncResult<Lead> {
        self.leads
            .read()
            .expect("lead map poisoned")
            .get(&id)
            .cloned()
            .ok_or(SyncError::LeadNotFound(id))
    }

    async fn lead_by_event(
        &self,
        tenant_id: Uuid,
        event_id: &str,
        contact_id: &str,
    ) -> SyncResult<Option<Lead>> {
        Ok(self
            .leads
            .read()
            .expect("lead map poisoned")
            .values()
            .find(|l| {
                l.tenant_id == tenant_id
                    && l.deleted_at.is_none()
                    && l.contact_id.as_deref() == Some(contact_id)
                    && (l.appointment.event_id.as_deref() == Some(event_id)
                        || l.install.event_id.as_deref() == Some(event_id))
            })
            .cloned())
    }

    async fn lead_by_contact(
        &self,
        tenant_id: Uuid,
        contact_id: &str,
    ) -> SyncResult<Option<Lead>> {
        Ok(self
            .leads
            .read()
            .expect("lead map poisoned")
            .values()
            .find(|l| {
                l.tenant_id == tenant_id
                    && l.deleted_at.is_none()
                    && l.contact_id.as_deref() == Some(contact_id)
            })
            .cloned())
    }

    async fn write_slot(&self, lead_id: Uuid, kind: SlotKind, patch: SlotPatch) -> SyncResult<()> {
        let mut leads = self.leads.write().expect("lead map poisoned");
        let lead = leads
            .get_mut(&lead_id)
            .ok_or(SyncError::LeadNotFound(lead_id))?;
        let slot = lead.slot_mut(kind);
        slot.date = patch.date;
        slot.time = patch.time;
        slot.event_id = patch.event_id;
        slot.last_synced_date = patch.last_synced_date;
        slot.last_synced_time = patch.last_synced_time;
        slot.last_synced_at = patch.last_synced_at;
        Ok(())
    }

    async fn set_contact_id(&self, lead_id: Uuid, contact_id: &str) -> SyncResult<()> {
        let mut leads = self.leads.write().expect("lead map poisoned");
        let lead = leads
            .get_mut(&lead_id)
            .ok_or(SyncError::LeadNotFound(lead_id))?;
        lead.contact_id = Some(contact_id.to_string());
        Ok(())
    }

    async fn set_sync_status(&self, lead_id: Uuid, status: SyncStatus) -> SyncResult<()> {
        let mut leads = self.leads.write().expect("lead map poisoned");
        let lead = leads
            .get_mut(&lead_id)
            .ok_or(SyncError::LeadNotFound(lead_id))?;
        lead.sync_status = status;
        lead.last_synced = Some(Utc::now());
        Ok(())
    }

    async fn tentative_installs_before(
        &self,
        tenant_id: Uuid,
        week_start: NaiveDate,
        created_before: DateTime<Utc>,
    ) -> SyncResult<u32> {
        let week_end = week_start + chrono::Duration::days(7);
        Ok(self
            .leads
            .read()
            .expect("lead map poisoned")
            .values()
            .filter(|l| {
                l.tenant_id == tenant_id
                    && l.deleted_at.is_none()
                    && l.install.tentative
                    && l.created_at < created_before
                    && l.install
                        .date
                        .is_some_and(|d| d >= week_start && d < week_end)
            })
            .count() as u32)
    }

    async fn record_error(&self, record: SyncErrorRecord) -> SyncResult<()> {
        self.errors.write().expect("error log poisoned").push(record);
        Ok(())
    }
}
