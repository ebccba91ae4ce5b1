use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::core::prelude::*;
use crate::domain::prelude::*;
use crate::error::ServiceError;
use crate::models::{location_from, TrackingRequest, TrackingResponse};

/// Header carrying the tracking producer's shared key.
pub const API_KEY_HEADER: &str = "apikey";

/// Resolves who is posting: the tracking producer when it presents the
/// configured key, otherwise the signed-in user.
fn actor(headers: &HeaderMap, state: &AppState) -> Result<Actor, ServiceError> {
    let presented = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    match (&state.config.tracking_api_key, presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(Actor::Tracker),
        (_, Some(_)) => Err(ServiceError::Auth("invalid api key".to_string())),
        (_, None) => Ok(Actor::User(Session::from_headers(headers)?)),
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Tracking ingestion.
///
/// Stores the cleaner's position and status on the booking and broadcasts it
/// on the booking's channel. The status defaults to `in_progress`. A body
/// that does not parse is a 400 with the same `{"error": ...}` shape as the
/// other failures.
///
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TrackingRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!("unreadable tracking payload: {}", rejection);
            return error(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };
    let Some(booking_id) = req.booking_id else {
        return error(StatusCode::BAD_REQUEST, "Booking ID is required");
    };

    let result = async {
        let actor = actor(&headers, &state)?;
        let location = location_from(req.latitude, req.longitude)?;
        let status = req.status.unwrap_or(BookingStatus::InProgress);
        state
            .bookings
            .report_progress(&actor, booking_id, status, location)
            .await
    }
    .await;

    match result {
        Ok(booking) => Json(TrackingResponse {
            success: true,
            message: "Location updated successfully".to_string(),
            data: booking,
        })
        .into_response(),
        Err(ServiceError::Transport(_)) => {
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update tracking info")
        }
        Err(err) => err.into_response(),
    }
}
