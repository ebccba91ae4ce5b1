use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::prelude::*;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::DBClient;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Which cleaner a conditional update expects to find on the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanerMatch {
    Any,
    Unassigned,
    Is(Uuid),
}

/// Precondition of a conditional update: the row must still be in `status`
/// and carry the expected cleaner at write time.
#[derive(Debug, Clone, Copy)]
pub struct Expect {
    pub status: BookingStatus,
    pub cleaner: CleanerMatch,
}

/// The write applied when the precondition holds. A `None` cleaner or
/// location leaves the stored value untouched.
#[derive(Debug, Clone, Copy)]
pub struct Change {
    pub status: BookingStatus,
    pub cleaner_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    pub updated_at: DateTime<Utc>,
}

impl Change {
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status,
            cleaner_id: None,
            location: None,
            updated_at: Utc::now(),
        }
    }

    pub fn assign(mut self, cleaner_id: Uuid) -> Self {
        self.cleaner_id = Some(cleaner_id);
        self
    }

    pub fn at(mut self, location: Option<GeoPoint>) -> Self {
        self.location = location;
        self
    }
}

/// Data access used by the services.
///
/// Every booking mutation goes through `update_booking_if`, which must check
/// the precondition and write in one atomic step. There is no
/// unconditional booking update.
///
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_booking(&self, booking: &Booking, extras: &[Uuid]) -> Result<Booking, StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Returns the updated row, or `None` when the row is missing or no longer
    /// matches `expect`.
    async fn update_booking_if(
        &self,
        id: Uuid,
        expect: Expect,
        change: Change,
    ) -> Result<Option<Booking>, StoreError>;

    /// Unassigned `pending` bookings, by schedule then id.
    async fn available_bookings(&self, limit: i64) -> Result<Vec<Booking>, StoreError>;

    /// Bookings assigned to the cleaner, latest scheduled date first.
    async fn bookings_for_cleaner(&self, cleaner_id: Uuid, limit: i64) -> Result<Vec<Booking>, StoreError>;

    /// Bookings made by the customer, newest first.
    async fn bookings_for_customer(&self, customer_id: Uuid) -> Result<Vec<Booking>, StoreError>;

    /// Sum of `total_price` over the cleaner's completed bookings created at
    /// or after `since`.
    async fn completed_total_since(&self, cleaner_id: Uuid, since: DateTime<Utc>) -> Result<f64, StoreError>;

    async fn get_cleaner_profile(&self, id: Uuid) -> Result<Option<CleanerProfile>, StoreError>;

    /// Creates the profile unless one already exists for the id, in which
    /// case `None` is returned and the stored row is left alone.
    async fn insert_cleaner_profile(&self, profile: &CleanerProfile) -> Result<Option<CleanerProfile>, StoreError>;

    async fn set_cleaner_status(
        &self,
        id: Uuid,
        status: CleanerStatus,
    ) -> Result<Option<CleanerProfile>, StoreError>;

    /// Inserts the review unless the booking already has one, in which case
    /// `None` is returned.
    async fn insert_review(&self, review: &Review) -> Result<Option<Review>, StoreError>;

    async fn reviews_for_cleaner(&self, cleaner_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn active_services(&self) -> Result<Vec<Service>, StoreError>;

    async fn active_extras(&self) -> Result<Vec<ServiceExtra>, StoreError>;
}
