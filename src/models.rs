use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::notifications::realtime::RealtimeHub;
use crate::scheduling::{Stores, booking::SchedulingService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
    pub stores: Stores,
    pub scheduling: Arc<SchedulingService>,
    pub realtime: RealtimeHub,
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub user: UserProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   Staff
--------------------------*/

/// Staff role as stored in `app_user.roles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum Role {
    Admin = 1,
    Manager = 2,
    Agent = 3,
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub roles: Role,
    pub is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Live staff session resolved from a bearer token digest.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionPrincipal {
    pub session_token_id: Uuid,
    pub user_id: Uuid,
    pub roles: Role,
}

/* -------------------------
   Scheduling entities
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum DocumentType {
    /// Cedula de ciudadania
    #[serde(rename = "CC")]
    CitizenId = 1,
    /// Cedula de extranjeria
    #[serde(rename = "CE")]
    ForeignId = 2,
    /// Tarjeta de identidad
    #[serde(rename = "TI")]
    MinorId = 3,
    /// Registro civil
    #[serde(rename = "RC")]
    CivilRegistry = 4,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub client_number: String,
    pub document_type: DocumentType,
    pub document_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Mobile first, landline as fallback.
    pub fn contact_phone(&self) -> Option<&str> {
        self.mobile
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.phone.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Branch {
    pub branch_id: Uuid,
    pub name: String,
    pub code: String,
    pub address: String,
    pub phone: Option<String>,
    pub city: String,
    pub state: String,
    pub is_main: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentType {
    pub appointment_type_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub estimated_minutes: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 1,
    Confirmed = 2,
    InProgress = 3,
    Completed = 4,
    Cancelled = 5,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Forward moves staff may apply. Cancellation has its own rule.
    pub fn can_advance_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Pending, AppointmentStatus::Confirmed)
                | (AppointmentStatus::Confirmed, AppointmentStatus::InProgress)
                | (AppointmentStatus::InProgress, AppointmentStatus::Completed)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub appointment_number: String,
    pub client_id: Uuid,
    pub branch_id: Uuid,
    pub appointment_type_id: Uuid,
    pub appointment_date: NaiveDate,
    /// "HH:mm" token as submitted by the booking portal.
    pub appointment_time: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum HolidayType {
    National = 1,
    Branch = 2,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Holiday {
    pub holiday_id: Uuid,
    pub holiday_date: NaiveDate,
    pub name: String,
    pub holiday_type: HolidayType,
    pub branch_id: Option<Uuid>,
    pub is_active: bool,
}

impl Holiday {
    pub fn applies_to(&self, branch_id: Uuid, date: NaiveDate) -> bool {
        self.is_active
            && self.holiday_date == date
            && match self.holiday_type {
                HolidayType::National => true,
                HolidayType::Branch => self.branch_id == Some(branch_id),
            }
    }
}

/* -------------------------
   Notification ledger
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum NotificationChannel {
    Email = 1,
    WhatsApp = 2,
    InApp = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum NotificationStatus {
    Pending = 1,
    Sent = 2,
    Failed = 3,
}

/// Exactly one recipient per ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(Uuid),
    Client(Uuid),
}

impl Recipient {
    pub fn user_id(self) -> Option<Uuid> {
        match self {
            Recipient::User(id) => Some(id),
            Recipient::Client(_) => None,
        }
    }

    pub fn client_id(self) -> Option<Uuid> {
        match self {
            Recipient::Client(id) => Some(id),
            Recipient::User(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
    pub recipient: Recipient,
    pub appointment_id: Option<Uuid>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn pending(
        channel: NotificationChannel,
        recipient: Recipient,
        appointment_id: Option<Uuid>,
        title: String,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            channel,
            title,
            message,
            status: NotificationStatus::Pending,
            error_message: None,
            recipient,
            appointment_id,
            sent_at: None,
            read_at: None,
            created_at: now,
        }
    }
}

/// Flat row shape of `notification`; `Notification` folds the two recipient
/// columns into `Recipient`.
#[derive(Debug, sqlx::FromRow)]
pub struct NotificationRow {
    pub notification_id: Uuid,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
    pub user_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = String;

    fn try_from(r: NotificationRow) -> Result<Self, Self::Error> {
        let recipient = match (r.user_id, r.client_id) {
            (Some(u), None) => Recipient::User(u),
            (None, Some(c)) => Recipient::Client(c),
            _ => {
                return Err(format!(
                    "notification {} must have exactly one recipient",
                    r.notification_id
                ));
            }
        };
        Ok(Notification {
            notification_id: r.notification_id,
            channel: r.channel,
            title: r.title,
            message: r.message,
            status: r.status,
            error_message: r.error_message,
            recipient,
            appointment_id: r.appointment_id,
            sent_at: r.sent_at,
            read_at: r.read_at,
            created_at: r.created_at,
        })
    }
}
