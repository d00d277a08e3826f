use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::error_response;
use crate::{AppState, DiagnosisCategory, NewReport, NewWeightSample};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/reports", post(submit))
        .route("/weights", post(record_weight))
        .route("/reports/{id}/approve", post(approve))
        .route("/reports/{id}/reject", post(reject))
}

/// Body of `POST /reports/{id}/approve`.
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    approver_id: Uuid,
    vet_notes: Option<String>,
    diagnosis_category: Option<DiagnosisCategory>,
}

/// Body of `POST /reports/{id}/reject`.
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    approver_id: Uuid,
    vet_notes: Option<String>,
}

async fn approve(
    Path(report_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ApproveRequest>,
) -> impl IntoResponse {
    // ---
    info!("POST /reports/{}/approve", report_id);
    debug!("approve request: {:?}", body);

    match state
        .desk
        .approve(
            report_id,
            body.approver_id,
            body.vet_notes,
            body.diagnosis_category,
        )
        .await
    {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn reject(
    Path(report_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<RejectRequest>,
) -> impl IntoResponse {
    // ---
    info!("POST /reports/{}/reject", report_id);

    match state
        .desk
        .reject(report_id, body.approver_id, body.vet_notes)
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn submit(State(state): State<AppState>, Json(body): Json<NewReport>) -> impl IntoResponse {
    // ---
    info!("POST /reports - flock {}", body.flock_id);

    match state.intake.submit_report(body).await {
        Ok(report) => (StatusCode::CREATED, Json(report)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn record_weight(
    State(state): State<AppState>,
    Json(body): Json<NewWeightSample>,
) -> impl IntoResponse {
    // ---
    info!("POST /weights - flock {}", body.flock_id);

    match state.intake.record_weight(body).await {
        Ok(sample) => (StatusCode::CREATED, Json(sample)).into_response(),
        Err(e) => error_response(&e),
    }
}
