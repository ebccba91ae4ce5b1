use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::tracking::GeoPoint;

/// Lifecycle of a booking.
///
/// The happy path is strictly ordered: `pending → confirmed → in_progress →
/// completed`. `cancelled` can only be reached from `pending` or `confirmed`.
/// `completed` and `cancelled` are terminal.
///
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move booking from {from} to {to}")]
pub struct InvalidTransition {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Whether a cleaner must be attached to a booking in this status.
    pub fn requires_cleaner(self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed | BookingStatus::InProgress | BookingStatus::Completed
        )
    }

    /// The next step on the happy path, if any.
    pub fn next(self) -> Option<BookingStatus> {
        match self {
            BookingStatus::Pending => Some(BookingStatus::Confirmed),
            BookingStatus::Confirmed => Some(BookingStatus::InProgress),
            BookingStatus::InProgress => Some(BookingStatus::Completed),
            BookingStatus::Completed | BookingStatus::Cancelled => None,
        }
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Validates a progress report moving a booking from `self` to `to`.
    ///
    /// Reports only exist once a cleaner is attached, so `pending` bookings
    /// reject them. Repeating the current status is a location refresh and is
    /// accepted while the job is live; otherwise only the next step is legal.
    ///
    pub fn check_progress(self, to: BookingStatus) -> Result<(), InvalidTransition> {
        let live = matches!(self, BookingStatus::Confirmed | BookingStatus::InProgress);
        if live && (to == self || self.next() == Some(to)) {
            Ok(())
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    pub fn check_cancel(self) -> Result<(), InvalidTransition> {
        if self.can_cancel() {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self,
                to: BookingStatus::Cancelled,
            })
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// Domain model for a scheduled cleaning job.
///
/// The same shape is served to the customer dashboard, the cleaner dashboard
/// and the tracking view; the cleaner id and last known location are simply
/// absent until a cleaner is attached.
///
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub cleaner_id: Option<Uuid>,
    pub service_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub address: String,
    pub special_instructions: Option<String>,
    pub total_price: f64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cleaner_location_lat: Option<f64>,
    pub cleaner_location_lng: Option<f64>,
}

impl Booking {
    /// A fresh, unassigned booking in `pending`.
    pub fn new(
        customer_id: Uuid,
        service_id: Uuid,
        scheduled_date: NaiveDate,
        scheduled_time: NaiveTime,
        address: String,
        special_instructions: Option<String>,
        total_price: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            cleaner_id: None,
            service_id,
            scheduled_date,
            scheduled_time,
            address,
            special_instructions,
            total_price,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
            cleaner_location_lat: None,
            cleaner_location_lng: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.cleaner_id.is_none() && self.status == BookingStatus::Pending
    }

    pub fn is_assigned_to(&self, cleaner_id: Uuid) -> bool {
        self.cleaner_id == Some(cleaner_id)
    }

    pub fn location(&self) -> Option<GeoPoint> {
        match (self.cleaner_location_lat, self.cleaner_location_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }

    /// Cleaner id is set exactly when the status needs one. A cancelled
    /// booking may keep the cleaner it had when it was cancelled.
    pub fn assignment_is_consistent(&self) -> bool {
        match self.status {
            BookingStatus::Cancelled => true,
            status => status.requires_cleaner() == self.cleaner_id.is_some(),
        }
    }
}
