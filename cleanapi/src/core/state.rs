use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::domain::prelude::*;
use crate::service::{BookingService, DashboardService, ReviewService};
use crate::store::BookingStore;
use crate::stream::{heartbeat, tracking::TrackingHub};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// The per-booking tracking topics.
    /// Shared by the services that publish and the websocket clients that listen.
    pub tracking: TrackingHub,

    pub bookings: BookingService,
    pub dashboard: DashboardService,
    pub reviews: ReviewService,

    /// The sender for the heartbeat channel.
    /// Used to broadcast heartbeats to the websocket clients.
    pub heartbeat_tx: broadcast::Sender<Heartbeat>,
}

impl AppState {
    /// Wires the services over one store and one tracking hub.
    ///
    /// Must be called inside a tokio runtime: it starts the heartbeat task.
    ///
    pub fn new(config: Config, store: Arc<dyn BookingStore>) -> Self {
        let tracking = TrackingHub::new(config.broadcast_buffer_size);
        let heartbeat_tx = heartbeat::channel(config.heartbeat_interval, tracking.clone());

        Self {
            bookings: BookingService::new(store.clone(), tracking.clone()),
            dashboard: DashboardService::new(store.clone(), config.jobs_page_size),
            reviews: ReviewService::new(store),
            tracking,
            heartbeat_tx,
            config: Arc::new(config),
        }
    }
}
