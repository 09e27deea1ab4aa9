//! Inbound CRM webhook endpoint

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};

use leadsync_core::webhook::{RejectCode, WebhookOutcome};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/crm", post(receive))
}

/// POST /webhooks/crm - Process an inbound calendar event webhook
async fn receive(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    let outcome = state.webhooks.handle(&payload).await?;

    let response = match outcome {
        WebhookOutcome::Ignored(reason) => {
            tracing::debug!(reason = reason.message(), "webhook ignored");
            (
                StatusCode::OK,
                Json(json!({ "status": "ignored", "message": reason.message() })),
            )
                .into_response()
        }
        WebhookOutcome::Applied {
            lead_id,
            slot,
            action,
        } => (
            StatusCode::OK,
            Json(json!({
                "status": "applied",
                "lead_id": lead_id,
                "slot": slot,
                "action": action,
            })),
        )
            .into_response(),
        WebhookOutcome::Rejected(violation) => {
            tracing::warn!(code = ?violation.code, message = %violation.message, "webhook rejected");
            let status = match violation.code {
                RejectCode::TypeUndetermined => StatusCode::UNPROCESSABLE_ENTITY,
                RejectCode::SlotOccupied
                | RejectCode::EventIdMismatch
                | RejectCode::NoEventIdStored => StatusCode::CONFLICT,
            };
            (
                status,
                Json(json!({
                    "error": violation.code,
                    "message": violation.message,
                })),
            )
                .into_response()
        }
    };

    Ok(response)
}
