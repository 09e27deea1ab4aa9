//! reqwest-backed CRM client.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::credentials::resolve_api_key;
use crate::crm::{
    ContactCreate, ContactWrite, CrmApi, EventUpdate, EventWrite, REQUEST_TIMEOUT,
};
use crate::error::{SyncError, SyncResult};
use crate::tenant::Tenant;

const DEFAULT_BASE_URL: &str = "https://services.leadconnectorhq.com";
/// Fixed API version header required on every request.
const API_VERSION: &str = "2021-07-28";

#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Base64-encoded 32-byte AES key for stored tenant credentials.
    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

impl Default for CrmConfig {
    fn default() -> Self {
        CrmConfig {
            base_url: default_base_url(),
            api_version: default_api_version(),
            encryption_key: None,
        }
    }
}

/// HTTP client for the external CRM. Every call carries per-tenant bearer
/// auth, the fixed version header and the 15s hard timeout.
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    master_key: Option<Vec<u8>>,
}

impl CrmClient {
    pub fn new(config: CrmConfig) -> Self {
        use base64::Engine;
        let master_key = config.encryption_key.as_deref().and_then(|k| {
            base64::engine::general_purpose::STANDARD
                .decode(k.trim())
                .ok()
        });

        CrmClient {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version,
            master_key,
        }
    }

    fn token(&self, tenant: &Tenant) -> SyncResult<String> {
        tenant
            .api_key
            .as_deref()
            .and_then(|stored| resolve_api_key(stored, self.master_key.as_deref()))
            .ok_or(SyncError::Credentials(tenant.id))
    }

    async fn request(
        &self,
        tenant: &Tenant,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<Value> {
        let token = self.token(tenant)?;
        let url = format!("{}{}", self.base_url, path);

        let mut req = self
            .http
            .request(method.clone(), &url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(token)
            .header("Version", &self.api_version)
            .header("Accept", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        tracing::debug!(%method, %url, tenant = %tenant.id, "crm request");

        let res = req.send().await?;
        let status = res.status();
        let raw = res.text().await?;
        let data: Value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));

        if !status.is_success() {
            tracing::warn!(%status, %url, "crm api error");
            return Err(SyncError::Api {
                status: status.as_u16(),
                body: data.to_string(),
            });
        }
        Ok(data)
    }
}

/// Pull the existing contact id out of a duplicate-contact error body.
fn duplicate_contact_id(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("meta")
        .and_then(|m| m.get("contactId"))
        .and_then(|id| id.as_str())
        .map(String::from)
}

#[async_trait]
impl CrmApi for CrmClient {
    async fn create_contact(
        &self,
        tenant: &Tenant,
        contact: &ContactWrite,
    ) -> SyncResult<ContactCreate> {
        let mut payload = contact.clone();
        payload.location_id = Some(tenant.location_id.clone());
        payload.source = Some("leadsync".to_string());
        let body = serde_json::to_value(&payload).expect("contact serializes");

        match self.request(tenant, Method::POST, "/contacts/", Some(&body)).await {
            Ok(data) => {
                let id = data
                    .get("contact")
                    .and_then(|c| c.get("id"))
                    .or_else(|| data.get("id"))
                    .and_then(|id| id.as_str())
                    .ok_or(SyncError::MissingField("contact.id"))?;
                Ok(ContactCreate::Created(id.to_string()))
            }
            Err(SyncError::Api { status, body }) => match duplicate_contact_id(&body) {
                Some(id) => Ok(ContactCreate::Duplicate(id)),
                None => Err(SyncError::Api { status, body }),
            },
            Err(err) => Err(err),
        }
    }

    async fn update_contact(
        &self,
        tenant: &Tenant,
        contact_id: &str,
        contact: &ContactWrite,
    ) -> SyncResult<()> {
        let body = serde_json::to_value(contact).expect("contact serializes");
        self.request(
            tenant,
            Method::PUT,
            &format!("/contacts/{contact_id}"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn add_tags(&self, tenant: &Tenant, contact_id: &str, tags: &[String]) -> SyncResult<()> {
        let body = serde_json::json!({ "tags": tags });
        self.request(
            tenant,
            Method::POST,
            &format!("/contacts/{contact_id}/tags"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_event(&self, tenant: &Tenant, event: &EventWrite) -> SyncResult<String> {
        let body = serde_json::to_value(event).expect("event serializes");
        let data = self
            .request(
                tenant,
                Method::POST,
                "/calendars/events/appointments",
                Some(&body),
            )
            .await?;
        data.get("id")
            .and_then(|id| id.as_str())
            .map(String::from)
            .ok_or(SyncError::MissingField("event.id"))
    }

    async fn update_event(
        &self,
        tenant: &Tenant,
        event_id: &str,
        event: &EventUpdate,
    ) -> SyncResult<()> {
        let body = serde_json::to_value(event).expect("event serializes");
        self.request(
            tenant,
            Method::PUT,
            &format!("/calendars/events/appointments/{event_id}"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete_event(&self, tenant: &Tenant, event_id: &str) -> SyncResult<()> {
        self.request(
            tenant,
            Method::DELETE,
            &format!("/calendars/events/appointments/{event_id}"),
            None,
        )
        .await?;
        Ok(())
    }
}
