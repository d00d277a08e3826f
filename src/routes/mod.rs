use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde::Serialize;

use crate::{AppState, FcrError};

mod fcr;
mod health;
mod reports;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(reports::router())
        .merge(fcr::router())
        .merge(health::router())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<&'a crate::Report>,
}

/// Map a domain error onto an HTTP response.
///
/// A transition on an already-resolved report answers 409 with the report's
/// current state so the caller can show it instead of a generic failure.
fn error_response(err: &FcrError) -> Response {
    // ---
    let (status, kind, current) = match err {
        FcrError::InvalidStateTransition { current, .. } => {
            (StatusCode::CONFLICT, "invalid_state_transition", Some(&**current))
        }
        FcrError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", None),
        FcrError::NegativeQuantity { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "negative_quantity", None)
        }
        FcrError::DateOutOfRange { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "date_out_of_range", None)
        }
        FcrError::AggregationGap { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "aggregation_gap", None)
        }
        FcrError::PartialRecomputeFailure { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "partial_recompute_failure", None)
        }
        FcrError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None),
    };

    let body = ErrorBody {
        error: kind,
        message: err.to_string(),
        current,
    };
    (status, Json(body)).into_response()
}
