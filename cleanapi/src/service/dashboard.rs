use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;

use crate::core::session::Session;
use crate::domain::prelude::*;
use crate::error::ServiceError;
use crate::models::EarningsSummary;
use crate::store::BookingStore;

/// Read side of the cleaner dashboard and the public catalog.
#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn BookingStore>,
    page_size: i64,
}

fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::default()).and_utc()
}

/// Lower bounds of the today / week / month earnings buckets.
///
/// Buckets filter on when the booking was created, not when it was completed:
/// a job booked 10 days ago and finished yesterday only counts towards the
/// month.
///
pub fn earnings_windows(now: DateTime<Utc>) -> [DateTime<Utc>; 3] {
    [
        start_of_day(now),
        start_of_day(now - Duration::days(7)),
        start_of_day(now - Duration::days(30)),
    ]
}

impl DashboardService {
    pub fn new(store: Arc<dyn BookingStore>, page_size: i64) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Jobs any cleaner may claim.
    pub async fn available_jobs(&self, session: &Session) -> Result<Vec<Booking>, ServiceError> {
        session.require(UserRole::Cleaner)?;
        Ok(self.store.available_bookings(self.page_size).await?)
    }

    pub async fn my_jobs(&self, session: &Session) -> Result<Vec<Booking>, ServiceError> {
        session.require(UserRole::Cleaner)?;
        Ok(self
            .store
            .bookings_for_cleaner(session.user_id, self.page_size)
            .await?)
    }

    pub async fn earnings(&self, session: &Session) -> Result<EarningsSummary, ServiceError> {
        self.earnings_at(session, Utc::now()).await
    }

    pub async fn earnings_at(&self, session: &Session, now: DateTime<Utc>) -> Result<EarningsSummary, ServiceError> {
        session.require(UserRole::Cleaner)?;
        let [today, week, month] = earnings_windows(now);

        Ok(EarningsSummary {
            today: self.store.completed_total_since(session.user_id, today).await?,
            week: self.store.completed_total_since(session.user_id, week).await?,
            month: self.store.completed_total_since(session.user_id, month).await?,
        })
    }

    pub async fn cleaner_profile(&self, session: &Session) -> Result<CleanerProfile, ServiceError> {
        session.require(UserRole::Cleaner)?;
        self.store
            .get_cleaner_profile(session.user_id)
            .await?
            .ok_or(ServiceError::NotFound(session.user_id))
    }

    /// Onboards the calling cleaner with an empty, offline profile.
    ///
    /// Registering twice is harmless: the existing profile comes back with
    /// `false` and nothing is overwritten.
    ///
    pub async fn register_cleaner(&self, session: &Session) -> Result<(CleanerProfile, bool), ServiceError> {
        session.require(UserRole::Cleaner)?;
        if let Some(profile) = self.store.insert_cleaner_profile(&CleanerProfile::new(session.user_id)).await? {
            tracing::info!("cleaner {} registered", session.user_id);
            return Ok((profile, true));
        }
        let existing = self
            .store
            .get_cleaner_profile(session.user_id)
            .await?
            .ok_or(ServiceError::NotFound(session.user_id))?;
        Ok((existing, false))
    }

    pub async fn set_availability(
        &self,
        session: &Session,
        status: CleanerStatus,
    ) -> Result<CleanerProfile, ServiceError> {
        session.require(UserRole::Cleaner)?;
        let profile = self
            .store
            .set_cleaner_status(session.user_id, status)
            .await?
            .ok_or(ServiceError::NotFound(session.user_id))?;
        tracing::info!("cleaner {} is now {:?}", session.user_id, status);
        Ok(profile)
    }

    pub async fn services(&self) -> Result<Vec<Service>, ServiceError> {
        Ok(self.store.active_services().await?)
    }

    pub async fn service_extras(&self) -> Result<Vec<ServiceExtra>, ServiceError> {
        Ok(self.store.active_extras().await?)
    }
}
