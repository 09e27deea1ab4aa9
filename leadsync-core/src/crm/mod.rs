//! Outbound CRM interface: contacts, tags and calendar events.

mod client;

pub use client::{CrmClient, CrmConfig};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SyncResult;
use crate::tenant::Tenant;

/// Hard per-call stop for every outbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A CRM custom field value.
#[derive(Debug, Clone, Serialize)]
pub struct CustomField {
    pub id: String,
    pub field_value: serde_json::Value,
}

/// Contact payload projected from a lead. `location_id` and `source` are
/// only serialized on create.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_fields: Vec<CustomField>,
}

/// Full calendar-event payload for create.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWrite {
    pub location_id: String,
    pub calendar_id: String,
    pub contact_id: String,
    pub title: String,
    /// The CRM displays this field as the event body.
    pub notes: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<String>,
}

/// Mutable-fields-only payload for update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Result of a contact create attempt. The CRM reports duplicates with the
/// existing contact id, which the caller reuses for an update instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactCreate {
    Created(String),
    Duplicate(String),
}

impl ContactCreate {
    pub fn contact_id(&self) -> &str {
        match self {
            ContactCreate::Created(id) | ContactCreate::Duplicate(id) => id,
        }
    }
}

/// Outbound CRM operations. Implemented by [`CrmClient`] for the real API and
/// by recording stubs in tests.
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn create_contact(
        &self,
        tenant: &Tenant,
        contact: &ContactWrite,
    ) -> SyncResult<ContactCreate>;

    async fn update_contact(
        &self,
        tenant: &Tenant,
        contact_id: &str,
        contact: &ContactWrite,
    ) -> SyncResult<()>;

    async fn add_tags(&self, tenant: &Tenant, contact_id: &str, tags: &[String]) -> SyncResult<()>;

    /// Create a calendar event, returning the externally-assigned event id.
    async fn create_event(&self, tenant: &Tenant, event: &EventWrite) -> SyncResult<String>;

    async fn update_event(
        &self,
        tenant: &Tenant,
        event_id: &str,
        event: &EventUpdate,
    ) -> SyncResult<()>;

    async fn delete_event(&self, tenant: &Tenant, event_id: &str) -> SyncResult<()>;
}
