//! Booking and cancellation rules over the relational store.
//!
//! Every persistence call goes through one of the traits below so the rules
//! can run against Postgres in production and an in-memory store in tests.

pub mod appointment_writer;
pub mod booking;
pub mod calendar_rules;
pub mod cancellation;
pub mod client_resolver;
pub mod pg_store;

#[cfg(test)]
pub mod memory_store;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::error::FieldError;
use crate::models::{
    Appointment, AppointmentType, Branch, Client, Holiday, HolidayType, Notification,
    NotificationStatus, SessionPrincipal,
};
use calendar_rules::DateRejection;
use pg_store::PgStore;

pub const CLIENT_NUMBER_PREFIX: &str = "CLI";
pub const APPOINTMENT_NUMBER_PREFIX: &str = "APT";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
    /// A unique key already holds this value.
    #[error("duplicate {0}")]
    Duplicate(&'static str),
}

impl StoreError {
    /// Maps a Postgres unique violation to `Duplicate(key)`.
    pub fn unique(key: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(key),
            _ => StoreError::Database(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("validation failed ({} field(s))", .0.len())]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    DateNotBookable(DateRejection),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Error {action}: {source}")]
    Operation {
        action: &'static str,
        #[source]
        source: StoreError,
    },
}

impl SchedulingError {
    /// Wraps an infrastructure failure so callers get the original text.
    pub fn operation(action: &'static str) -> impl FnOnce(StoreError) -> SchedulingError {
        move |source| SchedulingError::Operation { action, source }
    }
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_by_document(&self, document_number: &str) -> Result<Option<Client>, StoreError>;
    async fn find_by_id(&self, client_id: Uuid) -> Result<Option<Client>, StoreError>;
    async fn insert(&self, client: &Client) -> Result<Client, StoreError>;
    async fn set_active(&self, client_id: Uuid, active: bool) -> Result<Option<Client>, StoreError>;
}

#[async_trait]
pub trait BranchStore: Send + Sync {
    async fn find_by_id(&self, branch_id: Uuid) -> Result<Option<Branch>, StoreError>;
    async fn list_active(&self) -> Result<Vec<Branch>, StoreError>;
    /// Every branch, inactive ones included.
    async fn list_all(&self) -> Result<Vec<Branch>, StoreError>;
}

#[async_trait]
pub trait AppointmentTypeStore: Send + Sync {
    async fn find_by_id(&self, appointment_type_id: Uuid) -> Result<Option<AppointmentType>, StoreError>;
    async fn list_active(&self) -> Result<Vec<AppointmentType>, StoreError>;
}

#[async_trait]
pub trait HolidayStore: Send + Sync {
    /// First active holiday on `date` that is national or belongs to `branch_id`.
    /// National holidays win when both exist.
    async fn find_applicable(&self, branch_id: Uuid, date: NaiveDate) -> Result<Option<Holiday>, StoreError>;
    /// Active holidays in date order.
    async fn list(&self, filter: &HolidayFilter) -> Result<Vec<Holiday>, StoreError>;
    async fn insert(&self, holiday: &Holiday) -> Result<Holiday, StoreError>;
    async fn deactivate(&self, holiday_id: Uuid) -> Result<Option<Holiday>, StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct HolidayFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Keeps national holidays plus the ones of this branch.
    pub branch_id: Option<Uuid>,
}

impl HolidayFilter {
    pub fn matches(&self, h: &Holiday) -> bool {
        h.is_active
            && self.from.is_none_or(|d| h.holiday_date >= d)
            && self.to.is_none_or(|d| h.holiday_date <= d)
            && self
                .branch_id
                .is_none_or(|b| h.holiday_type == HolidayType::National || h.branch_id == Some(b))
    }
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;
    async fn find_by_number(&self, appointment_number: &str) -> Result<Option<Appointment>, StoreError>;
    async fn list_by_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, StoreError>;
    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, StoreError>;
    /// Persists status, cancellation reason, completion stamp and `updated_at`.
    async fn update_status(&self, appointment: &Appointment) -> Result<Appointment, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError>;
    async fn set_status(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
    async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, StoreError>;
    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Unrevoked, unexpired session of an active user.
    async fn find_active(&self, token_digest: &str) -> Result<Option<SessionPrincipal>, StoreError>;
    async fn touch(&self, session_token_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StaffDirectory: Send + Sync {
    /// Active staff users assigned to handle an appointment type.
    async fn users_for_appointment_type(&self, appointment_type_id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}

#[derive(Clone)]
pub struct Stores {
    pub clients: Arc<dyn ClientStore>,
    pub branches: Arc<dyn BranchStore>,
    pub appointment_types: Arc<dyn AppointmentTypeStore>,
    pub holidays: Arc<dyn HolidayStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub staff: Arc<dyn StaffDirectory>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let pg = Arc::new(PgStore::new(pool));
        Self {
            clients: pg.clone(),
            branches: pg.clone(),
            appointment_types: pg.clone(),
            holidays: pg.clone(),
            appointments: pg.clone(),
            notifications: pg.clone(),
            staff: pg.clone(),
            sessions: pg,
        }
    }
}

/// `PREFIX-YYYYMMDD-XXXXXXXX`, UTC date plus eight random uppercase hex digits.
pub fn generate_number(prefix: &str, now: DateTime<Utc>) -> String {
    const HEX: &[u8] = b"0123456789ABCDEF";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d"), suffix)
}
