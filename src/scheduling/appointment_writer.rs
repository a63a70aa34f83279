use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use super::{APPOINTMENT_NUMBER_PREFIX, AppointmentStore, SchedulingError, generate_number};
use crate::models::{Appointment, AppointmentStatus};

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub client_id: Uuid,
    pub branch_id: Uuid,
    pub appointment_type_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

pub struct AppointmentWriter {
    appointments: Arc<dyn AppointmentStore>,
}

impl AppointmentWriter {
    pub fn new(appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { appointments }
    }

    /// Inserts a pending appointment. Inputs are assumed validated.
    pub async fn write(&self, new: NewAppointment, now: DateTime<Utc>) -> Result<Appointment, SchedulingError> {
        let appointment = Appointment {
            appointment_id: Uuid::new_v4(),
            appointment_number: generate_number(APPOINTMENT_NUMBER_PREFIX, now),
            client_id: new.client_id,
            branch_id: new.branch_id,
            appointment_type_id: new.appointment_type_id,
            appointment_date: new.date,
            appointment_time: new.time,
            status: AppointmentStatus::Pending,
            notes: new.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            cancellation_reason: None,
            completed_at: None,
            is_enabled: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let saved = self
            .appointments
            .insert(&appointment)
            .await
            .map_err(SchedulingError::operation("creating appointment"))?;

        info!(
            appointment_number = %saved.appointment_number,
            branch_id = %saved.branch_id,
            date = %saved.appointment_date,
            time = %saved.appointment_time,
            "appointment created"
        );
        Ok(saved)
    }
}
