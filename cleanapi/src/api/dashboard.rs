use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::core::prelude::*;
use crate::domain::prelude::*;
use crate::error::ServiceError;
use crate::models::{CleanerStatusRequest, EarningsSummary, ReviewRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/available", get(available_jobs))
        .route("/jobs/mine", get(my_jobs))
        .route("/earnings", get(earnings))
        .route("/cleaner/profile", get(profile).post(register))
        .route("/cleaner/status", put(set_status))
        .route("/reviews", post(submit_review))
        .route("/cleaners/{id}/reviews", get(cleaner_reviews))
        .route("/services", get(services))
        .route("/services/extras", get(service_extras))
}

async fn available_jobs(State(state): State<AppState>, session: Session) -> Result<Json<Vec<Booking>>, ServiceError> {
    Ok(Json(state.dashboard.available_jobs(&session).await?))
}

async fn my_jobs(State(state): State<AppState>, session: Session) -> Result<Json<Vec<Booking>>, ServiceError> {
    Ok(Json(state.dashboard.my_jobs(&session).await?))
}

async fn earnings(State(state): State<AppState>, session: Session) -> Result<Json<EarningsSummary>, ServiceError> {
    Ok(Json(state.dashboard.earnings(&session).await?))
}

async fn profile(State(state): State<AppState>, session: Session) -> Result<Json<CleanerProfile>, ServiceError> {
    Ok(Json(state.dashboard.cleaner_profile(&session).await?))
}

async fn register(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse, ServiceError> {
    let (profile, created) = state.dashboard.register_cleaner(&session).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(profile)))
}

async fn set_status(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CleanerStatusRequest>,
) -> Result<Json<CleanerProfile>, ServiceError> {
    Ok(Json(state.dashboard.set_availability(&session, req.status).await?))
}

async fn submit_review(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let review = state.reviews.submit(&session, req).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn cleaner_reviews(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Review>>, ServiceError> {
    Ok(Json(state.reviews.for_cleaner(id).await?))
}

async fn services(State(state): State<AppState>) -> Result<Json<Vec<Service>>, ServiceError> {
    Ok(Json(state.dashboard.services().await?))
}

async fn service_extras(State(state): State<AppState>) -> Result<Json<Vec<ServiceExtra>>, ServiceError> {
    Ok(Json(state.dashboard.service_extras().await?))
}
