//! Lead CRUD and sync-trigger endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use leadsync_core::store::LeadStore;
use leadsync_core::{Lead, LeadStatus};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leads", get(list_leads))
        .route("/leads", post(create_lead))
        .route("/leads/{id}", get(get_lead))
        .route("/leads/{id}", put(update_lead))
        .route("/leads/{id}/sync", post(sync_lead))
}

/// Request body for creating a lead
#[derive(Deserialize)]
pub struct CreateLeadRequest {
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub lead_source: Option<String>,
    pub notes: Option<String>,
}

/// Scheduling fields for one slot. Sending the object replaces the slot's
/// date and time wholly; a null date clears the schedule.
#[derive(Deserialize)]
pub struct SlotEdit {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    #[serde(default)]
    pub tentative: bool,
}

/// Request body for updating a lead. Absent fields are left untouched.
#[derive(Deserialize)]
pub struct UpdateLeadRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub status: Option<LeadStatus>,
    pub notes: Option<String>,
    pub contract_price: Option<f64>,
    pub appointment: Option<SlotEdit>,
    pub install: Option<SlotEdit>,
}

/// GET /leads - List all leads
async fn list_leads(State(state): State<AppState>) -> Json<Vec<Lead>> {
    Json(state.store.all_leads())
}

/// GET /leads/:id - Fetch one lead
async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    Ok(Json(state.store.lead(id).await?))
}

/// POST /leads - Create a lead and push it to the CRM
async fn create_lead(
    State(state): State<AppState>,
    Json(req): Json<CreateLeadRequest>,
) -> Result<Json<Lead>, AppError> {
    let mut lead = Lead::new(req.tenant_id, &req.first_name, &req.last_name);
    lead.email = req.email;
    lead.phone = req.phone;
    lead.address = req.address;
    lead.city = req.city;
    lead.state = req.state;
    lead.zip = req.zip;
    lead.lead_source = req.lead_source;
    lead.notes = req.notes;
    state.store.insert_lead(lead.clone());

    trigger_sync(&state, lead.id);
    Ok(Json(lead))
}

/// PUT /leads/:id - Apply edits, then push the new state to the CRM
async fn update_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadRequest>,
) -> Result<Json<Lead>, AppError> {
    let lead = state.store.update_lead(id, |lead| {
        if let Some(v) = req.first_name {
            lead.first_name = v;
        }
        if let Some(v) = req.last_name {
            lead.last_name = v;
        }
        if let Some(v) = req.email {
            lead.email = Some(v);
        }
        if let Some(v) = req.phone {
            lead.phone = Some(v);
        }
        if let Some(v) = req.address {
            lead.address = Some(v);
        }
        if let Some(v) = req.city {
            lead.city = Some(v);
        }
        if let Some(v) = req.state {
            lead.state = Some(v);
        }
        if let Some(v) = req.zip {
            lead.zip = Some(v);
        }
        if let Some(v) = req.status {
            lead.status = v;
        }
        if let Some(v) = req.notes {
            lead.notes = Some(v);
        }
        if let Some(v) = req.contract_price {
            lead.contract_price = Some(v);
        }
        if let Some(edit) = req.appointment {
            lead.appointment.date = edit.date;
            lead.appointment.time = edit.time;
        }
        if let Some(edit) = req.install {
            lead.install.date = edit.date;
            lead.install.tentative = edit.tentative;
        }
    })?;

    trigger_sync(&state, id);
    Ok(Json(lead))
}

/// POST /leads/:id/sync - Run an explicit reconciliation now
async fn sync_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    match state.reconciler.sync_lead(id).await? {
        Some(report) => Ok(Json(json!({ "status": "synced", "report": report }))),
        None => Ok(Json(json!({ "status": "busy" }))),
    }
}

/// Saving a lead must never fail because the CRM is down; the sync runs in
/// the background and failures land in the error log.
fn trigger_sync(state: &AppState, lead_id: Uuid) {
    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        if let Err(err) = reconciler.sync_lead(lead_id).await {
            tracing::error!(lead = %lead_id, error = %err, "background sync failed");
        }
    });
}
