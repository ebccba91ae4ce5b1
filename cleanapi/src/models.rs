use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::prelude::*;
use crate::error::ServiceError;

#[derive(Deserialize, Serialize, Debug, Clone, Validate)]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    #[validate(required(message = "scheduled_date is required"))]
    pub scheduled_date: Option<NaiveDate>,
    #[validate(required(message = "scheduled_time is required"))]
    pub scheduled_time: Option<NaiveTime>,
    #[validate(length(min = 1, message = "address is required"))]
    pub address: String,
    #[validate(length(max = 1000))]
    pub special_instructions: Option<String>,
    #[validate(range(min = 0.0, message = "total_price must not be negative"))]
    pub total_price: f64,
    #[serde(default)]
    pub extras: Vec<Uuid>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProgressRequest {
    pub status: BookingStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Body accepted by the tracking ingestion endpoint.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest {
    pub booking_id: Option<Uuid>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<BookingStatus>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct TrackingResponse {
    pub success: bool,
    pub message: String,
    pub data: Booking,
}

#[derive(Deserialize, Serialize, Debug, Clone, Validate)]
pub struct ReviewRequest {
    pub booking_id: Uuid,
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CleanerStatusRequest {
    pub status: CleanerStatus,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct EarningsSummary {
    pub today: f64,
    pub week: f64,
    pub month: f64,
}

/// Pairs optional coordinates. Both or neither must be given.
pub fn location_from(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<GeoPoint>, ServiceError> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => {
            let point = GeoPoint::new(lat, lng);
            if point.is_valid() {
                Ok(Some(point))
            } else {
                Err(ServiceError::Validation("coordinates out of range".to_string()))
            }
        }
        (None, None) => Ok(None),
        _ => Err(ServiceError::Validation(
            "latitude and longitude must be sent together".to_string(),
        )),
    }
}
