use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::{AppointmentStore, SchedulingError};
use crate::models::{Appointment, AppointmentStatus};

pub const ALREADY_CANCELLED: &str = "Appointment is already cancelled";
pub const ALREADY_COMPLETED: &str = "Cannot cancel a completed appointment";
pub const NOT_FOUND: &str = "Appointment not found";

/// Pure cancel transition. Only status, reason and `updated_at` change.
pub fn apply_cancel(
    appointment: &Appointment,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Appointment, SchedulingError> {
    match appointment.status {
        AppointmentStatus::Cancelled => Err(SchedulingError::Rejected(ALREADY_CANCELLED.into())),
        AppointmentStatus::Completed => Err(SchedulingError::Rejected(ALREADY_COMPLETED.into())),
        AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::InProgress => {
            let mut next = appointment.clone();
            next.status = AppointmentStatus::Cancelled;
            next.cancellation_reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
            next.updated_at = now;
            Ok(next)
        }
    }
}

/// Pure staff transition along Pending -> Confirmed -> InProgress -> Completed.
pub fn apply_advance(
    appointment: &Appointment,
    next_status: AppointmentStatus,
    now: DateTime<Utc>,
) -> Result<Appointment, SchedulingError> {
    if !appointment.status.can_advance_to(next_status) {
        return Err(SchedulingError::Rejected(format!(
            "Cannot move appointment from {} to {}",
            appointment.status.label(),
            next_status.label()
        )));
    }
    let mut next = appointment.clone();
    next.status = next_status;
    if next_status == AppointmentStatus::Completed {
        next.completed_at = Some(now);
    }
    next.updated_at = now;
    Ok(next)
}

pub struct StatusTransitions {
    appointments: Arc<dyn AppointmentStore>,
}

impl StatusTransitions {
    pub fn new(appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { appointments }
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let current = self
            .appointments
            .find_by_id(appointment_id)
            .await
            .map_err(SchedulingError::operation("cancelling appointment"))?
            .ok_or_else(|| SchedulingError::NotFound(NOT_FOUND.into()))?;
        self.cancel_loaded(&current, reason, now).await
    }

    /// Cancels an appointment the caller already fetched.
    pub async fn cancel_loaded(
        &self,
        current: &Appointment,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let next = apply_cancel(current, reason, now).inspect_err(|e| {
            warn!(appointment_id = %current.appointment_id, "cancel rejected: {e}");
        })?;

        let saved = self
            .appointments
            .update_status(&next)
            .await
            .map_err(SchedulingError::operation("cancelling appointment"))?;
        info!(appointment_number = %saved.appointment_number, "appointment cancelled");
        Ok(saved)
    }

    pub async fn advance(
        &self,
        appointment_id: Uuid,
        next_status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let current = self
            .appointments
            .find_by_id(appointment_id)
            .await
            .map_err(SchedulingError::operation("updating appointment"))?
            .ok_or_else(|| SchedulingError::NotFound(NOT_FOUND.into()))?;

        let next = apply_advance(&current, next_status, now)?;
        let saved = self
            .appointments
            .update_status(&next)
            .await
            .map_err(SchedulingError::operation("updating appointment"))?;
        info!(
            appointment_number = %saved.appointment_number,
            status = saved.status.label(),
            "appointment status changed"
        );
        Ok(saved)
    }
}
