pub mod booking;

pub mod prelude {
    pub use super::{
        booking::{Booking, BookingStatus, InvalidTransition},
        catalog::{Service, ServiceExtra},
        cleaner::{CleanerProfile, CleanerStatus},
        heartbeat::Heartbeat,
        review::Review,
        tracking::{GeoPoint, TrackingUpdate},
        user::UserRole,
    };
}

pub mod tracking {
    use super::booking::{Booking, BookingStatus};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// A latitude/longitude pair reported by a cleaner's device.
    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
    pub struct GeoPoint {
        pub lat: f64,
        pub lng: f64,
    }

    impl GeoPoint {
        pub fn new(lat: f64, lng: f64) -> Self {
            Self { lat, lng }
        }

        pub fn is_valid(&self) -> bool {
            (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
        }
    }

    /// Message broadcast on a booking's tracking channel.
    ///
    /// It is never stored on its own: the booking row keeps the last known
    /// location and status, the message only refreshes live viewers.
    ///
    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct TrackingUpdate {
        pub booking_id: Uuid,
        pub latitude: Option<f64>,
        pub longitude: Option<f64>,
        pub status: BookingStatus,
        pub timestamp: DateTime<Utc>,
    }

    impl TrackingUpdate {
        /// Builds the update from the row as it was persisted, so the message
        /// always agrees with what a reconnecting viewer would read back.
        pub fn from_booking(booking: &Booking) -> Self {
            Self {
                booking_id: booking.id,
                latitude: booking.cleaner_location_lat,
                longitude: booking.cleaner_location_lng,
                status: booking.status,
                timestamp: booking.updated_at,
            }
        }
    }
}

pub mod cleaner {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
    #[sqlx(type_name = "cleaner_status", rename_all = "snake_case")]
    #[serde(rename_all = "snake_case")]
    pub enum CleanerStatus {
        Available,
        Busy,
        Offline,
    }

    /// Domain model for a cleaner's public profile. The id is the user id.
    ///
    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
    pub struct CleanerProfile {
        pub id: Uuid,
        pub bio: Option<String>,
        pub experience_years: i32,
        pub hourly_rate: f64,
        pub rating: f64,
        pub total_jobs: i32,
        pub status: CleanerStatus,
        pub verified: bool,
        pub created_at: DateTime<Utc>,
    }

    impl CleanerProfile {
        pub const MAX_RATING: f64 = 5.0;

        pub fn new(id: Uuid) -> Self {
            Self {
                id,
                bio: None,
                experience_years: 0,
                hourly_rate: 0.0,
                rating: 0.0,
                total_jobs: 0,
                status: CleanerStatus::Offline,
                verified: false,
                created_at: Utc::now(),
            }
        }
    }
}

pub mod review {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
    pub struct Review {
        pub id: Uuid,
        pub booking_id: Uuid,
        pub customer_id: Uuid,
        pub cleaner_id: Uuid,
        pub rating: i32,
        pub comment: Option<String>,
        pub created_at: DateTime<Utc>,
    }
}

pub mod catalog {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// A bookable cleaning service (standard, deep, move-out, ...).
    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
    pub struct Service {
        pub id: Uuid,
        pub name: String,
        pub description: Option<String>,
        pub base_price: f64,
        pub duration_hours: i32,
        pub service_type: String,
        pub is_active: bool,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq, sqlx::FromRow)]
    pub struct ServiceExtra {
        pub id: Uuid,
        pub name: String,
        pub description: Option<String>,
        pub price: f64,
        pub is_active: bool,
        pub created_at: DateTime<Utc>,
    }
}

pub mod user {
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum UserRole {
        Customer,
        Cleaner,
        Admin,
    }

    impl std::str::FromStr for UserRole {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "customer" => Ok(Self::Customer),
                "cleaner" => Ok(Self::Cleaner),
                "admin" => Ok(Self::Admin),
                _ => Err(()),
            }
        }
    }
}

pub mod heartbeat {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// Liveness beat pushed to every websocket. `server_time` lets a viewer
    /// judge how stale its last location fix is.
    #[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
    pub struct Heartbeat {
        pub status: String,
        pub server_time: DateTime<Utc>,
        /// Booking topics with a live handle or listener.
        pub open_channels: usize,
    }
}
