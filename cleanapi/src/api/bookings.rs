use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::core::prelude::*;
use crate::domain::prelude::*;
use crate::error::ServiceError;
use crate::models::{location_from, CreateBookingRequest, ProgressRequest};
use crate::stream::{simulator, tracking::channel_name};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create).get(list))
        .route("/bookings/{id}", get(show))
        .route("/bookings/{id}/accept", post(accept))
        .route("/bookings/{id}/progress", post(progress))
        .route("/bookings/{id}/cancel", post(cancel))
        .route("/bookings/{id}/simulate", post(simulate))
}

async fn create(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let booking = state.bookings.create(&session, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list(State(state): State<AppState>, session: Session) -> Result<Json<Vec<Booking>>, ServiceError> {
    Ok(Json(state.bookings.for_customer(&session).await?))
}

async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ServiceError> {
    Ok(Json(state.bookings.get(&session, id).await?))
}

async fn accept(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ServiceError> {
    Ok(Json(state.bookings.accept(&session, id).await?))
}

async fn progress(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<Booking>, ServiceError> {
    let location = location_from(req.latitude, req.longitude)?;
    let booking = state
        .bookings
        .report_progress(&Actor::User(session), id, req.status, location)
        .await?;
    Ok(Json(booking))
}

async fn cancel(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, ServiceError> {
    Ok(Json(state.bookings.cancel(&session, id).await?))
}

/// Starts a simulated device for a live booking, so the tracking view can be
/// exercised without a phone in the field.
async fn simulate(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    if !state.config.simulator_enabled {
        return Err(ServiceError::Validation("tracking simulator is disabled".to_string()));
    }
    let booking = state.bookings.get(&session, id).await?;
    if !booking.is_assigned_to(session.user_id) {
        return Err(ServiceError::Auth(format!("only the assigned cleaner can simulate booking {id}")));
    }
    booking.status.check_progress(BookingStatus::InProgress)?;

    simulator::spawn(
        state.bookings.clone(),
        id,
        booking.location().unwrap_or(simulator::DEFAULT_START),
        state.config.simulator_interval,
        state.config.simulator_steps,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "booking_id": id, "channel": channel_name(id) })),
    ))
}
