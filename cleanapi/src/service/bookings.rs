use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::core::session::{Actor, Session};
use crate::domain::prelude::*;
use crate::error::ServiceError;
use crate::models::CreateBookingRequest;
use crate::store::{BookingStore, Change, CleanerMatch, Expect};
use crate::stream::tracking::TrackingHub;

/// How many times a status write is retried when the row moved between the
/// read and the conditional update.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// The booking state machine.
///
/// Every mutation is a conditional update against the state that was just
/// validated, so two callers racing on the same booking can never both win.
///
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    tracking: TrackingHub,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, tracking: TrackingHub) -> Self {
        Self { store, tracking }
    }

    async fn load(&self, id: Uuid) -> Result<Booking, ServiceError> {
        self.store
            .get_booking(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    fn broadcast(&self, booking: &Booking) {
        let handle = self.tracking.open_channel(booking.id);
        self.tracking
            .publish(&handle, TrackingUpdate::from_booking(booking));
        self.tracking.close_channel(handle);
    }

    /// Creates a `pending` booking for the calling customer.
    pub async fn create(&self, session: &Session, req: CreateBookingRequest) -> Result<Booking, ServiceError> {
        session.require(UserRole::Customer)?;
        req.validate()?;

        let (Some(date), Some(time)) = (req.scheduled_date, req.scheduled_time) else {
            return Err(ServiceError::Validation("schedule is required".to_string()));
        };
        if !req.total_price.is_finite() {
            return Err(ServiceError::Validation("total_price must be a number".to_string()));
        }
        let address = req.address.trim();
        if address.is_empty() {
            return Err(ServiceError::Validation("address is required".to_string()));
        }

        let booking = Booking::new(
            session.user_id,
            req.service_id,
            date,
            time,
            address.to_string(),
            req.special_instructions.filter(|s| !s.trim().is_empty()),
            req.total_price,
        );
        let booking = self.store.insert_booking(&booking, &req.extras).await?;

        tracing::info!("booking {} created by customer {}", booking.id, session.user_id);
        Ok(booking)
    }

    /// Claims an available booking for the calling cleaner.
    ///
    /// The claim only lands if the booking is still `pending` and unassigned
    /// at write time. Losing that race is a `Conflict`, not a failure of the
    /// caller.
    ///
    pub async fn accept(&self, session: &Session, id: Uuid) -> Result<Booking, ServiceError> {
        session.require(UserRole::Cleaner)?;

        let expect = Expect {
            status: BookingStatus::Pending,
            cleaner: CleanerMatch::Unassigned,
        };
        let change = Change::status(BookingStatus::Confirmed).assign(session.user_id);

        match self.store.update_booking_if(id, expect, change).await? {
            Some(booking) => {
                tracing::info!("booking {} accepted by cleaner {}", id, session.user_id);
                Ok(booking)
            }
            None => {
                // tell a missing booking apart from one somebody else took
                self.load(id).await?;
                tracing::warn!("cleaner {} lost booking {}", session.user_id, id);
                Err(ServiceError::Conflict(id))
            }
        }
    }

    /// Records progress on a live job and pushes it to the booking's viewers.
    ///
    /// `status` may repeat the current status (a location refresh) or move
    /// one step forward. A missing `location` keeps the last known one.
    ///
    pub async fn report_progress(
        &self,
        actor: &Actor,
        id: Uuid,
        status: BookingStatus,
        location: Option<GeoPoint>,
    ) -> Result<Booking, ServiceError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let booking = self.load(id).await?;
            if !actor.may_report_for(&booking) {
                return Err(ServiceError::Auth(format!(
                    "only the assigned cleaner can report on booking {id}"
                )));
            }
            booking.status.check_progress(status)?;

            let expect = Expect {
                status: booking.status,
                cleaner: booking
                    .cleaner_id
                    .map_or(CleanerMatch::Unassigned, CleanerMatch::Is),
            };
            let change = Change::status(status).at(location);

            if let Some(updated) = self.store.update_booking_if(id, expect, change).await? {
                if updated.status != booking.status {
                    tracing::info!("booking {} moved {} -> {}", id, booking.status, updated.status);
                }
                self.broadcast(&updated);
                return Ok(updated);
            }
            tracing::debug!("booking {} changed during progress report, re-reading", id);
        }
        Err(ServiceError::Conflict(id))
    }

    /// Cancels a booking that has not started yet. Allowed to its customer,
    /// its assigned cleaner and admins.
    pub async fn cancel(&self, session: &Session, id: Uuid) -> Result<Booking, ServiceError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let booking = self.load(id).await?;
            let allowed = session.is_admin()
                || booking.customer_id == session.user_id
                || booking.is_assigned_to(session.user_id);
            if !allowed {
                return Err(ServiceError::Auth(format!("cannot cancel booking {id}")));
            }
            booking.status.check_cancel()?;

            let expect = Expect {
                status: booking.status,
                cleaner: CleanerMatch::Any,
            };
            let change = Change::status(BookingStatus::Cancelled);

            if let Some(updated) = self.store.update_booking_if(id, expect, change).await? {
                tracing::info!("booking {} cancelled by {}", id, session.user_id);
                self.broadcast(&updated);
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(id))
    }

    /// The persisted row, which is what a (re)connecting viewer starts from.
    pub async fn get(&self, session: &Session, id: Uuid) -> Result<Booking, ServiceError> {
        let booking = self.load(id).await?;
        let visible = session.is_admin()
            || booking.customer_id == session.user_id
            || booking.is_assigned_to(session.user_id)
            || (session.role == UserRole::Cleaner && booking.is_available());
        if visible {
            Ok(booking)
        } else {
            Err(ServiceError::Auth(format!("cannot view booking {id}")))
        }
    }

    pub async fn for_customer(&self, session: &Session) -> Result<Vec<Booking>, ServiceError> {
        Ok(self.store.bookings_for_customer(session.user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::stream::tracking::ConnectionStatus;
    use chrono::{NaiveDate, NaiveTime};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<MemoryStore>,
        hub: TrackingHub,
        service: BookingService,
        customer: Session,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let hub = TrackingHub::default();
        let service = BookingService::new(store.clone(), hub.clone());
        Fixture {
            store,
            hub,
            service,
            customer: Session::customer(Uuid::new_v4()),
        }
    }

    fn request(price: f64) -> CreateBookingRequest {
        CreateBookingRequest {
            service_id: Uuid::new_v4(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 25),
            scheduled_time: NaiveTime::from_hms_opt(9, 30, 0),
            address: "22 Jacaranda Ave".to_string(),
            special_instructions: Some("Keys under the mat".to_string()),
            total_price: price,
            extras: vec![],
        }
    }

    async fn confirmed(f: &Fixture) -> (Booking, Session) {
        let booking = f.service.create(&f.customer, request(299.0)).await.unwrap();
        let cleaner = Session::cleaner(Uuid::new_v4());
        let booking = f.service.accept(&cleaner, booking.id).await.unwrap();
        (booking, cleaner)
    }

    #[tokio::test]
    async fn create_starts_pending_and_unassigned() {
        let f = fixture();
        let mut req = request(299.0);
        let extra = Uuid::new_v4();
        req.extras = vec![extra];

        let booking = f.service.create(&f.customer, req).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.cleaner_id, None);
        assert_eq!(booking.customer_id, f.customer.user_id);
        assert_eq!(f.store.extras_for_booking(booking.id).await, vec![extra]);
    }

    #[tokio::test]
    async fn create_rejects_bad_input_before_writing() {
        let f = fixture();
        let err = f.service.create(&f.customer, request(-5.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut req = request(10.0);
        req.scheduled_time = None;
        let err = f.service.create(&f.customer, req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut req = request(10.0);
        req.address = "   ".to_string();
        let err = f.service.create(&f.customer, req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        assert!(f.store.bookings_for_customer(f.customer.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleaners_cannot_create_and_customers_cannot_accept() {
        let f = fixture();
        let cleaner = Session::cleaner(Uuid::new_v4());
        let err = f.service.create(&cleaner, request(10.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Auth(_)));

        let booking = f.service.create(&f.customer, request(10.0)).await.unwrap();
        let err = f.service.accept(&f.customer, booking.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Auth(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_have_exactly_one_winner() {
        let f = fixture();
        let booking = f.service.create(&f.customer, request(299.0)).await.unwrap();

        let booking_id = booking.id;
        let cleaners: Vec<Session> = (0..8).map(|_| Session::cleaner(Uuid::new_v4())).collect();
        let attempts = cleaners.iter().map(|cleaner| {
            let service = f.service.clone();
            let cleaner = *cleaner;
            tokio::spawn(async move { service.accept(&cleaner, booking_id).await })
        });
        let results = futures::future::join_all(attempts).await;

        let mut winners = Vec::new();
        for result in results {
            match result.unwrap() {
                Ok(b) => winners.push(b.cleaner_id.unwrap()),
                Err(ServiceError::Conflict(id)) => assert_eq!(id, booking.id),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);

        let stored = f.store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.cleaner_id, Some(winners[0]));
        assert!(stored.assignment_is_consistent());
    }

    #[tokio::test]
    async fn accept_of_unknown_booking_is_not_found() {
        let f = fixture();
        let cleaner = Session::cleaner(Uuid::new_v4());
        let err = f.service.accept(&cleaner, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn progress_moves_forward_and_publishes() {
        let f = fixture();
        let (booking, cleaner) = confirmed(&f).await;

        let handle = f.hub.open_channel(booking.id);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = f.hub.subscribe(
            &handle,
            move |u| {
                let _ = tx.send(u);
            },
            |_: ConnectionStatus| {},
        );

        let here = GeoPoint::new(-26.2041, 28.0473);
        let updated = f
            .service
            .report_progress(&Actor::User(cleaner), booking.id, BookingStatus::InProgress, Some(here))
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::InProgress);
        assert_eq!(updated.location(), Some(here));
        assert!(updated.updated_at >= booking.updated_at);

        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.booking_id, booking.id);
        assert_eq!(seen.status, BookingStatus::InProgress);
        assert_eq!(seen.latitude, Some(here.lat));
    }

    #[tokio::test]
    async fn progress_rejects_backward_and_skipped_steps() {
        let f = fixture();
        let (booking, cleaner) = confirmed(&f).await;
        let actor = Actor::User(cleaner);

        let err = f
            .service
            .report_progress(&actor, booking.id, BookingStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        f.service
            .report_progress(&actor, booking.id, BookingStatus::InProgress, None)
            .await
            .unwrap();
        for status in [BookingStatus::Pending, BookingStatus::Confirmed, BookingStatus::Cancelled] {
            let err = f
                .service
                .report_progress(&actor, booking.id, status, None)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidTransition(_)));
        }

        let stored = f.store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::InProgress);
    }

    #[tokio::test]
    async fn pending_booking_cannot_jump_to_in_progress() {
        let f = fixture();
        let booking = f.service.create(&f.customer, request(50.0)).await.unwrap();
        let err = f
            .service
            .report_progress(&Actor::Tracker, booking.id, BookingStatus::InProgress, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn only_the_assigned_cleaner_or_tracker_reports() {
        let f = fixture();
        let (booking, _cleaner) = confirmed(&f).await;

        let stranger = Actor::User(Session::cleaner(Uuid::new_v4()));
        let err = f
            .service
            .report_progress(&stranger, booking.id, BookingStatus::InProgress, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Auth(_)));

        let updated = f
            .service
            .report_progress(&Actor::Tracker, booking.id, BookingStatus::InProgress, None)
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::InProgress);
    }

    #[tokio::test]
    async fn location_refresh_keeps_status() {
        let f = fixture();
        let (booking, cleaner) = confirmed(&f).await;
        let actor = Actor::User(cleaner);

        f.service
            .report_progress(&actor, booking.id, BookingStatus::InProgress, Some(GeoPoint::new(1.0, 1.0)))
            .await
            .unwrap();
        let updated = f
            .service
            .report_progress(&actor, booking.id, BookingStatus::InProgress, Some(GeoPoint::new(2.0, 2.0)))
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::InProgress);
        assert_eq!(updated.location(), Some(GeoPoint::new(2.0, 2.0)));
    }

    #[tokio::test]
    async fn cancel_only_before_work_starts() {
        let f = fixture();
        let pending = f.service.create(&f.customer, request(80.0)).await.unwrap();
        let cancelled = f.service.cancel(&f.customer, pending.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let err = f.service.cancel(&f.customer, pending.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        let (booking, cleaner) = confirmed(&f).await;
        f.service
            .report_progress(&Actor::User(cleaner), booking.id, BookingStatus::InProgress, None)
            .await
            .unwrap();
        let err = f.service.cancel(&f.customer, booking.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn cancelled_booking_keeps_its_cleaner_and_cannot_be_taken() {
        let f = fixture();
        let (booking, cleaner) = confirmed(&f).await;

        let cancelled = f.service.cancel(&cleaner, booking.id).await.unwrap();
        assert_eq!(cancelled.cleaner_id, Some(cleaner.user_id));
        assert!(cancelled.assignment_is_consistent());

        let other = Session::cleaner(Uuid::new_v4());
        let err = f.service.accept(&other, booking.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn strangers_cannot_cancel_or_view() {
        let f = fixture();
        let (booking, _) = confirmed(&f).await;
        let stranger = Session::customer(Uuid::new_v4());

        assert!(matches!(
            f.service.cancel(&stranger, booking.id).await.unwrap_err(),
            ServiceError::Auth(_)
        ));
        assert!(matches!(
            f.service.get(&stranger, booking.id).await.unwrap_err(),
            ServiceError::Auth(_)
        ));
        assert_eq!(f.service.get(&f.customer, booking.id).await.unwrap().id, booking.id);
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_transport_error() {
        let f = fixture();
        let (booking, cleaner) = confirmed(&f).await;
        f.store.set_unavailable(true);

        let err = f
            .service
            .report_progress(&Actor::User(cleaner), booking.id, BookingStatus::InProgress, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }
}
