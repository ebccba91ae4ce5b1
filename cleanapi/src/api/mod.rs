use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::core::prelude::*;

pub mod bookings;
pub mod dashboard;
pub mod tracking;
pub mod ws;

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

/// Browser clients call from any origin with their gateway token and the
/// tracking producer's `apikey`.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static(tracking::API_KEY_HEADER),
            CONTENT_TYPE,
        ])
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/tracking", post(tracking::ingest))
        .route("/ws", get(ws::endpoint))
        .merge(bookings::routes())
        .merge(dashboard::routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
