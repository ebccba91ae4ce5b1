use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::prelude::*;
use crate::store::StoreError;

/// Every failure an operation can surface to its caller.
///
/// External failures (data store, channel) are converted into `Transport` at
/// the operation boundary, so callers only ever see these kinds.
///
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Booking {0} is no longer available")]
    Conflict(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not authorized: {0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(Uuid),
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        tracing::error!("store failure: {}", error);
        ServiceError::Transport(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::Validation(errors.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// The message shown to the client. Store internals never leak out.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Transport(_) => "Something went wrong, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.public_message() }));
        (self.status_code(), body).into_response()
    }
}
