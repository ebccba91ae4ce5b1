use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookingStore, Change, CleanerMatch, Expect, StoreError};
use crate::domain::prelude::*;

#[derive(Debug, Default)]
struct Tables {
    bookings: HashMap<Uuid, Booking>,
    booking_extras: Vec<(Uuid, Uuid)>,
    cleaner_profiles: HashMap<Uuid, CleanerProfile>,
    reviews: Vec<Review>,
    services: Vec<Service>,
    service_extras: Vec<ServiceExtra>,
}

/// In-process store used for local development and tests.
///
/// All tables sit behind one lock, so a conditional update checks and writes
/// while holding the write guard.
///
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail, as a lost database would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn put_cleaner_profile(&self, profile: CleanerProfile) {
        self.tables.write().await.cleaner_profiles.insert(profile.id, profile);
    }

    pub async fn put_service(&self, service: Service) {
        self.tables.write().await.services.push(service);
    }

    pub async fn put_service_extra(&self, extra: ServiceExtra) {
        self.tables.write().await.service_extras.push(extra);
    }

    pub async fn extras_for_booking(&self, booking_id: Uuid) -> Vec<Uuid> {
        self.tables
            .read()
            .await
            .booking_extras
            .iter()
            .filter(|(id, _)| *id == booking_id)
            .map(|(_, extra)| *extra)
            .collect()
    }
}

fn row_matches(booking: &Booking, expect: &Expect) -> bool {
    let cleaner_ok = match expect.cleaner {
        CleanerMatch::Any => true,
        CleanerMatch::Unassigned => booking.cleaner_id.is_none(),
        CleanerMatch::Is(id) => booking.cleaner_id == Some(id),
    };
    booking.status == expect.status && cleaner_ok
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: &Booking, extras: &[Uuid]) -> Result<Booking, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        tables.bookings.insert(booking.id, booking.clone());
        tables
            .booking_extras
            .extend(extras.iter().map(|extra| (booking.id, *extra)));
        Ok(booking.clone())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.check()?;
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn update_booking_if(
        &self,
        id: Uuid,
        expect: Expect,
        change: Change,
    ) -> Result<Option<Booking>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let Some(booking) = tables.bookings.get_mut(&id) else {
            return Ok(None);
        };
        if !row_matches(booking, &expect) {
            return Ok(None);
        }

        booking.status = change.status;
        if let Some(cleaner_id) = change.cleaner_id {
            booking.cleaner_id = Some(cleaner_id);
        }
        if let Some(location) = change.location {
            booking.cleaner_location_lat = Some(location.lat);
            booking.cleaner_location_lng = Some(location.lng);
        }
        booking.updated_at = change.updated_at;
        Ok(Some(booking.clone()))
    }

    async fn available_bookings(&self, limit: i64) -> Result<Vec<Booking>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.is_available())
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.scheduled_date, b.scheduled_time, b.id));
        bookings.truncate(limit.max(0) as usize);
        Ok(bookings)
    }

    async fn bookings_for_cleaner(&self, cleaner_id: Uuid, limit: i64) -> Result<Vec<Booking>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.is_assigned_to(cleaner_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| {
            b.scheduled_date
                .cmp(&a.scheduled_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        bookings.truncate(limit.max(0) as usize);
        Ok(bookings)
    }

    async fn bookings_for_customer(&self, customer_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.customer_id == customer_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn completed_total_since(&self, cleaner_id: Uuid, since: DateTime<Utc>) -> Result<f64, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.is_assigned_to(cleaner_id))
            .filter(|b| b.status == BookingStatus::Completed && b.created_at >= since)
            .map(|b| b.total_price)
            .sum())
    }

    async fn get_cleaner_profile(&self, id: Uuid) -> Result<Option<CleanerProfile>, StoreError> {
        self.check()?;
        Ok(self.tables.read().await.cleaner_profiles.get(&id).cloned())
    }

    async fn insert_cleaner_profile(&self, profile: &CleanerProfile) -> Result<Option<CleanerProfile>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.cleaner_profiles.contains_key(&profile.id) {
            return Ok(None);
        }
        tables.cleaner_profiles.insert(profile.id, profile.clone());
        Ok(Some(profile.clone()))
    }

    async fn set_cleaner_status(
        &self,
        id: Uuid,
        status: CleanerStatus,
    ) -> Result<Option<CleanerProfile>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(tables.cleaner_profiles.get_mut(&id).map(|profile| {
            profile.status = status;
            profile.clone()
        }))
    }

    async fn insert_review(&self, review: &Review) -> Result<Option<Review>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.reviews.iter().any(|r| r.booking_id == review.booking_id) {
            return Ok(None);
        }
        tables.reviews.push(review.clone());
        Ok(Some(review.clone()))
    }

    async fn reviews_for_cleaner(&self, cleaner_id: Uuid) -> Result<Vec<Review>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .iter()
            .filter(|r| r.cleaner_id == cleaner_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn active_services(&self) -> Result<Vec<Service>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.services.iter().filter(|s| s.is_active).cloned().collect())
    }

    async fn active_extras(&self) -> Result<Vec<ServiceExtra>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .service_extras
            .iter()
            .filter(|e| e.is_active)
            .cloned()
            .collect())
    }
}
