//! Booking and cancellation flows as exposed to the HTTP layer.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use super::appointment_writer::{AppointmentWriter, NewAppointment};
use super::calendar_rules::CalendarRules;
use super::cancellation::{NOT_FOUND, StatusTransitions};
use super::client_resolver::{ClientDetails, ClientResolver};
use super::{SchedulingError, Stores};
use crate::error::FieldError;
use crate::models::{Appointment, AppointmentStatus, DocumentType};
use crate::notifications::{DispatchReport, NotificationDispatcher, NotificationEvent};

#[derive(Debug, Clone, Deserialize)]
pub struct SimpleBookingRequest {
    pub document_type: DocumentType,
    pub document_number: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub branch_id: Uuid,
    pub appointment_type_id: Uuid,
    /// `YYYY-MM-DD`
    pub appointment_date: String,
    /// `HH:mm`
    pub appointment_time: String,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleBookingResult {
    pub appointment_id: Uuid,
    pub client_number: String,
    pub appointment_number: String,
    pub message: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub branch_name: String,
    pub status: AppointmentStatus,
}

/// A committed result plus the detached notification task it triggered.
pub struct Dispatched<T> {
    pub value: T,
    pub notifications: JoinHandle<DispatchReport>,
}

pub struct SchedulingService {
    stores: Stores,
    resolver: ClientResolver,
    calendar: CalendarRules,
    writer: AppointmentWriter,
    transitions: StatusTransitions,
    dispatcher: Arc<NotificationDispatcher>,
}

impl SchedulingService {
    pub fn new(stores: Stores, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            resolver: ClientResolver::new(stores.clients.clone()),
            calendar: CalendarRules::new(stores.holidays.clone()),
            writer: AppointmentWriter::new(stores.appointments.clone()),
            transitions: StatusTransitions::new(stores.appointments.clone()),
            stores,
            dispatcher,
        }
    }

    pub fn calendar(&self) -> &CalendarRules {
        &self.calendar
    }

    /// Checks run in a fixed order: input, branch, appointment type, client
    /// resolution, calendar rules, write. A client resolved before a calendar
    /// rejection stays persisted.
    pub async fn schedule_simple(
        &self,
        req: SimpleBookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Dispatched<SimpleBookingResult>, SchedulingError> {
        let (date, time) = validate_booking(&req)?;

        let branch = self
            .stores
            .branches
            .find_by_id(req.branch_id)
            .await
            .map_err(SchedulingError::operation("scheduling appointment"))?
            .filter(|b| b.is_active)
            .ok_or_else(|| SchedulingError::Unavailable("The selected branch is not available".into()))?;

        let appointment_type = self
            .stores
            .appointment_types
            .find_by_id(req.appointment_type_id)
            .await
            .map_err(SchedulingError::operation("scheduling appointment"))?
            .filter(|t| t.is_active)
            .ok_or_else(|| SchedulingError::NotFound("Appointment type not found".into()))?;

        let client = self
            .resolver
            .resolve(
                ClientDetails {
                    document_type: req.document_type,
                    document_number: req.document_number,
                    full_name: req.full_name,
                    email: req.email,
                    phone: req.phone,
                    mobile: req.mobile,
                    address: req.address,
                },
                now,
            )
            .await?;

        self.calendar
            .ensure_bookable(branch.branch_id, date, now.date_naive())
            .await?;

        let appointment = self
            .writer
            .write(
                NewAppointment {
                    client_id: client.client_id,
                    branch_id: branch.branch_id,
                    appointment_type_id: appointment_type.appointment_type_id,
                    date,
                    time,
                    notes: req.observations,
                },
                now,
            )
            .await?;

        let value = SimpleBookingResult {
            appointment_id: appointment.appointment_id,
            client_number: client.client_number,
            appointment_number: appointment.appointment_number.clone(),
            message: "Appointment scheduled successfully".to_string(),
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time.clone(),
            branch_name: branch.name,
            status: appointment.status,
        };
        let notifications = self.dispatcher.spawn_booking(appointment);
        Ok(Dispatched { value, notifications })
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Dispatched<Appointment>, SchedulingError> {
        let cancelled = self.transitions.cancel(appointment_id, reason, now).await?;
        Ok(self.after_cancel(cancelled))
    }

    /// Client-initiated cancel; the document number must own the appointment.
    pub async fn cancel_by_number(
        &self,
        appointment_number: &str,
        document_number: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Dispatched<Appointment>, SchedulingError> {
        let op = "cancelling appointment";
        let current = self
            .stores
            .appointments
            .find_by_number(appointment_number.trim())
            .await
            .map_err(SchedulingError::operation(op))?
            .ok_or_else(|| SchedulingError::NotFound(NOT_FOUND.into()))?;
        let owner = self
            .stores
            .clients
            .find_by_id(current.client_id)
            .await
            .map_err(SchedulingError::operation(op))?;
        if owner.map(|c| c.document_number) != Some(document_number.trim().to_string()) {
            return Err(SchedulingError::NotFound(NOT_FOUND.into()));
        }

        let cancelled = self.transitions.cancel_loaded(&current, reason, now).await?;
        Ok(self.after_cancel(cancelled))
    }

    fn after_cancel(&self, cancelled: Appointment) -> Dispatched<Appointment> {
        let notifications = self.dispatcher.spawn(
            cancelled.appointment_id,
            NotificationEvent::Cancellation { reason: cancelled.cancellation_reason.clone() },
        );
        Dispatched { value: cancelled, notifications }
    }

    pub async fn advance(
        &self,
        appointment_id: Uuid,
        next_status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        self.transitions.advance(appointment_id, next_status, now).await
    }

    pub async fn remind(&self, appointment_id: Uuid) -> Result<Dispatched<Appointment>, SchedulingError> {
        let appointment = self
            .stores
            .appointments
            .find_by_id(appointment_id)
            .await
            .map_err(SchedulingError::operation("sending reminder"))?
            .ok_or_else(|| SchedulingError::NotFound(NOT_FOUND.into()))?;
        if appointment.status.is_terminal() {
            return Err(SchedulingError::Rejected(
                "Cannot send a reminder for a closed appointment".into(),
            ));
        }
        info!(appointment_number = %appointment.appointment_number, "reminder requested");
        let notifications = self.dispatcher.spawn(appointment_id, NotificationEvent::Reminder);
        Ok(Dispatched { value: appointment, notifications })
    }

    pub async fn appointments_for_document(&self, document_number: &str) -> Result<Vec<Appointment>, SchedulingError> {
        let op = "listing appointments";
        let client = self
            .stores
            .clients
            .find_by_document(document_number.trim())
            .await
            .map_err(SchedulingError::operation(op))?
            .ok_or_else(|| SchedulingError::NotFound("Client not found".into()))?;
        self.stores
            .appointments
            .list_by_client(client.client_id)
            .await
            .map_err(SchedulingError::operation(op))
    }
}

/// Collects every field problem; returns the parsed date and time token.
pub fn validate_booking(req: &SimpleBookingRequest) -> Result<(NaiveDate, String), SchedulingError> {
    let mut errors = Vec::new();

    let doc = req.document_number.trim();
    if doc.is_empty() {
        errors.push(FieldError::new("document_number", "document_number is required"));
    } else if !(3..=20).contains(&doc.len()) || !doc.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push(FieldError::new(
            "document_number",
            "document_number must be 3-20 letters or digits",
        ));
    }

    let name = req.full_name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("full_name", "full_name is required"));
    } else if name.chars().count() > 150 {
        errors.push(FieldError::new("full_name", "full_name is too long (max 150)"));
    }

    let phones: Vec<&str> = [req.phone.as_deref(), req.mobile.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if phones.is_empty() {
        errors.push(FieldError::new("mobile", "phone or mobile is required"));
    }
    for p in phones {
        if !p.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')')) {
            errors.push(FieldError::new("mobile", format!("invalid phone number: {p}")));
        }
    }

    if let Some(email) = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if !looks_like_email(email) {
            errors.push(FieldError::new("email", "email is not a valid address"));
        }
    }

    let date = NaiveDate::parse_from_str(req.appointment_date.trim(), "%Y-%m-%d");
    if date.is_err() {
        errors.push(FieldError::new("appointment_date", "appointment_date must be YYYY-MM-DD"));
    }

    let time = req.appointment_time.trim();
    if !is_hh_mm(time) {
        errors.push(FieldError::new("appointment_time", "appointment_time must be HH:mm"));
    }

    if req.observations.as_deref().is_some_and(|o| o.chars().count() > 500) {
        errors.push(FieldError::new("observations", "observations is too long (max 500)"));
    }

    match date {
        Ok(d) if errors.is_empty() => Ok((d, time.to_string())),
        _ => Err(SchedulingError::Validation(errors)),
    }
}

fn is_hh_mm(s: &str) -> bool {
    s.len() == 5 && NaiveTime::parse_from_str(s, "%H:%M").is_ok()
}

fn looks_like_email(s: &str) -> bool {
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !s.contains(char::is_whitespace)
                && domain.split('.').count() >= 2
                && domain.split('.').all(|p| !p.is_empty())
        }
        _ => false,
    }
}
