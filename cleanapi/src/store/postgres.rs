use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use uuid::Uuid;

use super::{BookingStore, Change, CleanerMatch, Expect, StoreError};
use crate::domain::prelude::*;

const BOOKING_COLUMNS: &str = r#"
    id, customer_id, cleaner_id, service_id,
    scheduled_date, scheduled_time, address, special_instructions,
    total_price::FLOAT8 AS total_price,
    COALESCE(status, 'pending') AS status,
    COALESCE(created_at, NOW()) AS created_at,
    COALESCE(updated_at, created_at, NOW()) AS updated_at,
    cleaner_location_lat, cleaner_location_lng
"#;

const CLEANER_COLUMNS: &str = r#"
    id, bio,
    COALESCE(experience_years, 0) AS experience_years,
    COALESCE(hourly_rate, 0)::FLOAT8 AS hourly_rate,
    COALESCE(rating, 0)::FLOAT8 AS rating,
    COALESCE(total_jobs, 0) AS total_jobs,
    COALESCE(status, 'offline') AS status,
    COALESCE(verified, FALSE) AS verified,
    COALESCE(created_at, NOW()) AS created_at
"#;

const REVIEW_COLUMNS: &str = r#"
    id, booking_id, customer_id, cleaner_id, rating, comment,
    COALESCE(created_at, NOW()) AS created_at
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl BookingStore for DBClient {
    async fn insert_booking(&self, booking: &Booking, extras: &[Uuid]) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings (
                id, customer_id, service_id, scheduled_date, scheduled_time,
                address, special_instructions, total_price, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking.id)
        .bind(booking.customer_id)
        .bind(booking.service_id)
        .bind(booking.scheduled_date)
        .bind(booking.scheduled_time)
        .bind(&booking.address)
        .bind(&booking.special_instructions)
        .bind(booking.total_price)
        .bind(booking.status)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        for extra_id in extras {
            sqlx::query(
                r#"
                INSERT INTO booking_extras (booking_id, extra_id, quantity)
                VALUES ($1, $2, 1)
                "#,
            )
            .bind(inserted.id)
            .bind(extra_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn update_booking_if(
        &self,
        id: Uuid,
        expect: Expect,
        change: Change,
    ) -> Result<Option<Booking>, StoreError> {
        // check and write happen in the same statement
        let cleaner_clause = match expect.cleaner {
            CleanerMatch::Any => "TRUE",
            CleanerMatch::Unassigned => "cleaner_id IS NULL",
            CleanerMatch::Is(_) => "cleaner_id = $8",
        };

        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $2,
                cleaner_id = COALESCE($3, cleaner_id),
                cleaner_location_lat = COALESCE($4, cleaner_location_lat),
                cleaner_location_lng = COALESCE($5, cleaner_location_lng),
                updated_at = $6
            WHERE id = $1 AND status = $7 AND {cleaner_clause}
            RETURNING {BOOKING_COLUMNS}
            "#
        );

        let mut query = sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .bind(change.status)
            .bind(change.cleaner_id)
            .bind(change.location.map(|p| p.lat))
            .bind(change.location.map(|p| p.lng))
            .bind(change.updated_at)
            .bind(expect.status);

        if let CleanerMatch::Is(cleaner_id) = expect.cleaner {
            query = query.bind(cleaner_id);
        }

        let updated = query.fetch_optional(&self.pool).await?;
        Ok(updated)
    }

    async fn available_bookings(&self, limit: i64) -> Result<Vec<Booking>, StoreError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE cleaner_id IS NULL AND status = 'pending'
            ORDER BY scheduled_date, scheduled_time, id
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn bookings_for_cleaner(&self, cleaner_id: Uuid, limit: i64) -> Result<Vec<Booking>, StoreError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE cleaner_id = $1
            ORDER BY scheduled_date DESC, id
            LIMIT $2
            "#
        ))
        .bind(cleaner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn bookings_for_customer(&self, customer_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE customer_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn completed_total_since(&self, cleaner_id: Uuid, since: DateTime<Utc>) -> Result<f64, StoreError> {
        let total = sqlx::query_scalar::<_, f64>(
            r#"
            SELECT COALESCE(SUM(total_price), 0)::FLOAT8
            FROM bookings
            WHERE cleaner_id = $1 AND status = 'completed' AND created_at >= $2
            "#,
        )
        .bind(cleaner_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn get_cleaner_profile(&self, id: Uuid) -> Result<Option<CleanerProfile>, StoreError> {
        let profile = sqlx::query_as::<_, CleanerProfile>(&format!(
            "SELECT {CLEANER_COLUMNS} FROM cleaner_profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn insert_cleaner_profile(&self, profile: &CleanerProfile) -> Result<Option<CleanerProfile>, StoreError> {
        let inserted = sqlx::query_as::<_, CleanerProfile>(&format!(
            r#"
            INSERT INTO cleaner_profiles
                (id, bio, experience_years, hourly_rate, rating, total_jobs, status, verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            RETURNING {CLEANER_COLUMNS}
            "#
        ))
        .bind(profile.id)
        .bind(&profile.bio)
        .bind(profile.experience_years)
        .bind(profile.hourly_rate)
        .bind(profile.rating)
        .bind(profile.total_jobs)
        .bind(profile.status)
        .bind(profile.verified)
        .bind(profile.created_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn set_cleaner_status(
        &self,
        id: Uuid,
        status: CleanerStatus,
    ) -> Result<Option<CleanerProfile>, StoreError> {
        let profile = sqlx::query_as::<_, CleanerProfile>(&format!(
            r#"
            UPDATE cleaner_profiles
            SET status = $2
            WHERE id = $1
            RETURNING {CLEANER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn insert_review(&self, review: &Review) -> Result<Option<Review>, StoreError> {
        let inserted = sqlx::query_as::<_, Review>(&format!(
            r#"
            INSERT INTO reviews (id, booking_id, customer_id, cleaner_id, rating, comment, created_at)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (SELECT 1 FROM reviews WHERE booking_id = $2)
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review.id)
        .bind(review.booking_id)
        .bind(review.customer_id)
        .bind(review.cleaner_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn reviews_for_cleaner(&self, cleaner_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE cleaner_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(cleaner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn active_services(&self) -> Result<Vec<Service>, StoreError> {
        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT id, name, description,
                   base_price::FLOAT8 AS base_price,
                   duration_hours,
                   service_type::TEXT AS service_type,
                   COALESCE(is_active, TRUE) AS is_active,
                   COALESCE(created_at, NOW()) AS created_at
            FROM services
            WHERE is_active = TRUE
            ORDER BY base_price, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(services)
    }

    async fn active_extras(&self) -> Result<Vec<ServiceExtra>, StoreError> {
        let extras = sqlx::query_as::<_, ServiceExtra>(
            r#"
            SELECT id, name, description,
                   price::FLOAT8 AS price,
                   COALESCE(is_active, TRUE) AS is_active,
                   COALESCE(created_at, NOW()) AS created_at
            FROM service_extras
            WHERE is_active = TRUE
            ORDER BY price, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(extras)
    }
}
