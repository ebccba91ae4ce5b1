use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::domain::prelude::*;
use crate::error::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity of the caller, as vouched for by the identity provider in front
/// of this service. Every operation that cares about who is asking takes one
/// explicitly.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Session {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn customer(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Customer)
    }

    pub fn cleaner(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Cleaner)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require(&self, role: UserRole) -> Result<(), ServiceError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ServiceError::Auth(format!(
                "this action requires the {:?} role",
                role
            )))
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServiceError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ServiceError::Auth("missing caller identity".to_string()))?
            .parse::<Uuid>()
            .map_err(|_| ServiceError::Auth("malformed caller identity".to_string()))?;

        let role = header(USER_ROLE_HEADER)
            .unwrap_or("customer")
            .parse::<UserRole>()
            .map_err(|_| ServiceError::Auth("unknown caller role".to_string()))?;

        Ok(Self::new(user_id, role))
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Session::from_headers(&parts.headers)
    }
}

/// Who is driving a progress report: a signed-in user, or the tracking
/// producer acting on behalf of the assigned cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Session),
    Tracker,
}

impl Actor {
    pub fn may_report_for(&self, booking: &Booking) -> bool {
        match self {
            Actor::Tracker => true,
            Actor::User(session) => booking.is_assigned_to(session.user_id),
        }
    }
}
