use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::core::session::Session;
use crate::domain::prelude::*;
use crate::error::ServiceError;
use crate::models::ReviewRequest;
use crate::store::BookingStore;

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn BookingStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Rates the cleaner of a completed booking. One review per booking, left
    /// by the booking's customer.
    pub async fn submit(&self, session: &Session, req: ReviewRequest) -> Result<Review, ServiceError> {
        session.require(UserRole::Customer)?;
        req.validate()?;

        let booking = self
            .store
            .get_booking(req.booking_id)
            .await?
            .ok_or(ServiceError::NotFound(req.booking_id))?;
        if booking.customer_id != session.user_id {
            return Err(ServiceError::Auth(format!(
                "cannot review booking {}",
                booking.id
            )));
        }
        let (BookingStatus::Completed, Some(cleaner_id)) = (booking.status, booking.cleaner_id) else {
            return Err(ServiceError::Validation(
                "only completed bookings can be reviewed".to_string(),
            ));
        };

        let review = Review {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            customer_id: session.user_id,
            cleaner_id,
            rating: req.rating,
            comment: req.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        };

        match self.store.insert_review(&review).await? {
            Some(review) => {
                tracing::info!("booking {} reviewed: {}/5", review.booking_id, review.rating);
                Ok(review)
            }
            None => Err(ServiceError::Validation(format!(
                "booking {} has already been reviewed",
                booking.id
            ))),
        }
    }

    pub async fn for_cleaner(&self, cleaner_id: Uuid) -> Result<Vec<Review>, ServiceError> {
        Ok(self.store.reviews_for_cleaner(cleaner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveTime};

    async fn booking(store: &MemoryStore, customer: Uuid, status: BookingStatus) -> Booking {
        let mut booking = Booking::new(
            customer,
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 10, 2).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            "3 Protea Lane".to_string(),
            None,
            250.0,
        );
        booking.cleaner_id = Some(Uuid::new_v4());
        booking.status = status;
        store.insert_booking(&booking, &[]).await.unwrap()
    }

    fn rate(booking_id: Uuid, rating: i32) -> ReviewRequest {
        ReviewRequest {
            booking_id,
            rating,
            comment: Some("  Spotless kitchen ".to_string()),
        }
    }

    #[tokio::test]
    async fn customer_reviews_completed_booking_once() {
        let store = Arc::new(MemoryStore::new());
        let customer = Session::customer(Uuid::new_v4());
        let done = booking(&store, customer.user_id, BookingStatus::Completed).await;
        let service = ReviewService::new(store);

        let review = service.submit(&customer, rate(done.id, 5)).await.unwrap();
        assert_eq!(Some(review.cleaner_id), done.cleaner_id);
        assert_eq!(review.comment.as_deref(), Some("Spotless kitchen"));

        assert!(matches!(
            service.submit(&customer, rate(done.id, 4)).await,
            Err(ServiceError::Validation(_))
        ));

        let reviews = service.for_cleaner(review.cleaner_id).await.unwrap();
        assert_eq!(reviews, vec![review]);
    }

    #[tokio::test]
    async fn unfinished_or_foreign_bookings_cannot_be_reviewed() {
        let store = Arc::new(MemoryStore::new());
        let customer = Session::customer(Uuid::new_v4());
        let live = booking(&store, customer.user_id, BookingStatus::InProgress).await;
        let other = booking(&store, Uuid::new_v4(), BookingStatus::Completed).await;
        let service = ReviewService::new(store);

        assert!(matches!(
            service.submit(&customer, rate(live.id, 4)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.submit(&customer, rate(other.id, 4)).await,
            Err(ServiceError::Auth(_))
        ));
        assert!(matches!(
            service.submit(&customer, rate(Uuid::new_v4(), 4)).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rating_out_of_range_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let customer = Session::customer(Uuid::new_v4());
        let done = booking(&store, customer.user_id, BookingStatus::Completed).await;
        let service = ReviewService::new(store);

        assert!(matches!(
            service.submit(&customer, rate(done.id, 0)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.submit(&customer, rate(done.id, 6)).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
