use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::error_response;
use crate::{AppState, RecalcReport};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/fcr/recalculate", post(recalculate))
        .route("/flocks/{id}/fcr", get(flock_fcr))
}

/// Body of `POST /fcr/recalculate`; `{}` recalculates every flock.
#[derive(Debug, Default, Deserialize)]
pub struct RecalculateRequest {
    flock_id: Option<Uuid>,
}

#[derive(Serialize)]
struct RecalculateResponse {
    success: bool,
    #[serde(flatten)]
    report: RecalcReport,
}

async fn recalculate(
    State(state): State<AppState>,
    Json(body): Json<RecalculateRequest>,
) -> impl IntoResponse {
    // ---
    info!("POST /fcr/recalculate - scope {:?}", body.flock_id);

    let shutdown = state.recalculator.shutdown_flag();
    let report = match state.recalculator.recalculate(body.flock_id, &shutdown).await {
        Ok(report) => report,
        Err(e) => return error_response(&e),
    };

    // Per-flock failures go in the body; the run itself still answers.
    let success = match report.ensure_complete() {
        Ok(()) => !report.cancelled,
        Err(e) => {
            warn!("{}", e);
            false
        }
    };
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, Json(RecalculateResponse { success, report })).into_response()
}

async fn flock_fcr(Path(flock_id): Path<Uuid>, State(state): State<AppState>) -> impl IntoResponse {
    // ---
    info!("GET /flocks/{}/fcr", flock_id);

    match state.recalculator.flock_view(flock_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => error_response(&e),
    }
}
