use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::session::Actor;
use crate::domain::prelude::*;
use crate::service::bookings::BookingService;

/// Where a simulated cleaner starts when the booking has no known location.
pub const DEFAULT_START: GeoPoint = GeoPoint {
    lat: -26.2041,
    lng: 28.0473,
};

/// Largest step, in degrees, the simulated cleaner moves per tick.
const JITTER: f64 = 0.001;

/// Spawn a fake cleaner device for a booking.
///
/// Every `every` the simulated position drifts a little and is fed through
/// `report_progress` as the tracker, exactly as a real device posting to the
/// ingestion endpoint would. The task stops after `steps` reports or at the
/// first rejected one (the booking was completed or cancelled meanwhile).
///
pub fn spawn(
    bookings: BookingService,
    booking_id: Uuid,
    start: GeoPoint,
    every: Duration,
    steps: usize,
) -> JoinHandle<()> {
    let mut stream = stream_locations(start, every).take(steps);

    tokio::spawn(async move {
        tracing::info!("simulating cleaner for booking {}", booking_id);
        while let Some(point) = stream.next().await {
            let report = bookings
                .report_progress(&Actor::Tracker, booking_id, BookingStatus::InProgress, Some(point))
                .await;
            if let Err(err) = report {
                tracing::info!("simulator for booking {} stopped: {}", booking_id, err);
                return;
            }
        }
        tracing::debug!("simulator for booking {} finished", booking_id);
    })
}

/// A stream of positions wandering around `start`, one per `every`.
///
fn stream_locations(start: GeoPoint, every: Duration) -> impl Stream<Item = GeoPoint> + Send + Unpin {
    let stream = futures::stream::unfold(start, move |point| async move {
        tokio::time::sleep(every).await;
        let next = jitter(point);
        Some((next, next))
    });

    Box::pin(stream)
}

fn jitter(point: GeoPoint) -> GeoPoint {
    GeoPoint::new(
        point.lat + (rand::random::<f64>() - 0.5) * JITTER,
        point.lng + (rand::random::<f64>() - 0.5) * JITTER,
    )
}
