//! In-memory store used by unit and router tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::*;
use crate::auth::token_digest;
use crate::models::{DocumentType, Role};

#[derive(Default)]
struct Tables {
    clients: Vec<Client>,
    branches: Vec<Branch>,
    types: Vec<AppointmentType>,
    holidays: Vec<Holiday>,
    appointments: Vec<Appointment>,
    notifications: Vec<Notification>,
    assignments: HashMap<Uuid, Vec<Uuid>>,
    sessions: HashMap<String, SessionPrincipal>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    read_failure: Mutex<Option<String>>,
    write_failure: Mutex<Option<String>>,
    /// Document lookups that report no client, emulating a concurrent first booking.
    missed_client_lookups: Mutex<usize>,
}

impl MemoryStore {
    /// Every subsequent read fails with `msg`.
    pub fn fail_reads(&self, msg: &str) {
        *self.read_failure.lock().unwrap() = Some(msg.to_string());
    }

    /// Every subsequent write fails with `msg`.
    pub fn fail_writes(&self, msg: &str) {
        *self.write_failure.lock().unwrap() = Some(msg.to_string());
    }

    pub fn miss_next_client_lookups(&self, n: usize) {
        *self.missed_client_lookups.lock().unwrap() = n;
    }

    fn check_read(&self) -> Result<(), StoreError> {
        match self.read_failure.lock().unwrap().as_ref() {
            Some(m) => Err(StoreError::Backend(m.clone())),
            None => Ok(()),
        }
    }

    fn check_write(&self) -> Result<(), StoreError> {
        match self.write_failure.lock().unwrap().as_ref() {
            Some(m) => Err(StoreError::Backend(m.clone())),
            None => Ok(()),
        }
    }

    pub fn add_branch(&self, name: &str) -> Branch {
        let b = Branch {
            branch_id: Uuid::new_v4(),
            name: name.to_string(),
            code: format!("B{}", self.tables.lock().unwrap().branches.len() + 1),
            address: format!("Calle 7 # 6-{}", name.len()),
            phone: None,
            city: "Neiva".into(),
            state: "Huila".into(),
            is_main: false,
            is_active: true,
        };
        self.tables.lock().unwrap().branches.push(b.clone());
        b
    }

    pub fn add_appointment_type(&self, name: &str) -> AppointmentType {
        let t = AppointmentType {
            appointment_type_id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            estimated_minutes: 30,
            is_active: true,
        };
        self.tables.lock().unwrap().types.push(t.clone());
        t
    }

    pub fn add_holiday(&self, date: NaiveDate, name: &str, kind: HolidayType, branch_id: Option<Uuid>) -> Holiday {
        let h = Holiday {
            holiday_id: Uuid::new_v4(),
            holiday_date: date,
            name: name.to_string(),
            holiday_type: kind,
            branch_id,
            is_active: true,
        };
        self.tables.lock().unwrap().holidays.push(h.clone());
        h
    }

    pub fn holiday(&self, holiday_id: Uuid) -> Option<Holiday> {
        let t = self.tables.lock().unwrap();
        t.holidays.iter().find(|h| h.holiday_id == holiday_id).cloned()
    }

    /// Opens a session for a new active staff user and returns `(user_id, bearer token)`.
    pub fn add_session(&self, role: Role) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let token = format!("test-token-{}", Uuid::new_v4().simple());
        self.tables.lock().unwrap().sessions.insert(
            token_digest(&token),
            SessionPrincipal {
                session_token_id: Uuid::new_v4(),
                user_id,
                roles: role,
            },
        );
        (user_id, token)
    }

    pub fn client(&self, client_id: Uuid) -> Option<Client> {
        let t = self.tables.lock().unwrap();
        t.clients.iter().find(|c| c.client_id == client_id).cloned()
    }

    pub fn put_notification(&self, notification: Notification) {
        self.tables.lock().unwrap().notifications.push(notification);
    }

    pub fn add_client(&self, document_number: &str, email: Option<&str>, mobile: Option<&str>) -> Client {
        let now = Utc::now();
        let c = Client {
            client_id: Uuid::new_v4(),
            client_number: generate_number(CLIENT_NUMBER_PREFIX, now),
            document_type: DocumentType::CitizenId,
            document_number: document_number.to_string(),
            full_name: "Maria Fernanda Rojas".into(),
            email: email.map(str::to_string),
            phone: None,
            mobile: mobile.map(str::to_string),
            address: Some("Carrera 5 # 10-20".into()),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().clients.push(c.clone());
        c
    }

    pub fn assign_staff(&self, appointment_type_id: Uuid, user_id: Uuid) {
        self.tables
            .lock()
            .unwrap()
            .assignments
            .entry(appointment_type_id)
            .or_default()
            .push(user_id);
    }

    pub fn deactivate_branch(&self, branch_id: Uuid) {
        let mut t = self.tables.lock().unwrap();
        if let Some(b) = t.branches.iter_mut().find(|b| b.branch_id == branch_id) {
            b.is_active = false;
        }
    }

    pub fn client_count(&self) -> usize {
        self.tables.lock().unwrap().clients.len()
    }

    pub fn appointment_count(&self) -> usize {
        self.tables.lock().unwrap().appointments.len()
    }

    pub fn appointment(&self, appointment_id: Uuid) -> Option<Appointment> {
        self.tables
            .lock()
            .unwrap()
            .appointments
            .iter()
            .find(|a| a.appointment_id == appointment_id)
            .cloned()
    }

    pub fn put_appointment(&self, appointment: Appointment) {
        self.tables.lock().unwrap().appointments.push(appointment);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.tables.lock().unwrap().notifications.clone()
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn find_by_document(&self, document_number: &str) -> Result<Option<Client>, StoreError> {
        self.check_read()?;
        {
            let mut missed = self.missed_client_lookups.lock().unwrap();
            if *missed > 0 {
                *missed -= 1;
                return Ok(None);
            }
        }
        let t = self.tables.lock().unwrap();
        Ok(t.clients.iter().find(|c| c.document_number == document_number).cloned())
    }

    async fn find_by_id(&self, client_id: Uuid) -> Result<Option<Client>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.clients.iter().find(|c| c.client_id == client_id).cloned())
    }

    async fn insert(&self, client: &Client) -> Result<Client, StoreError> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if t.clients.iter().any(|c| c.document_number == client.document_number) {
            return Err(StoreError::Duplicate("document_number"));
        }
        t.clients.push(client.clone());
        Ok(client.clone())
    }

    async fn set_active(&self, client_id: Uuid, active: bool) -> Result<Option<Client>, StoreError> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        Ok(t.clients.iter_mut().find(|c| c.client_id == client_id).map(|c| {
            c.is_active = active;
            c.updated_at = Utc::now();
            c.clone()
        }))
    }
}

#[async_trait]
impl BranchStore for MemoryStore {
    async fn find_by_id(&self, branch_id: Uuid) -> Result<Option<Branch>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.branches.iter().find(|b| b.branch_id == branch_id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Branch>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.branches.iter().filter(|b| b.is_active).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Branch>, StoreError> {
        self.check_read()?;
        Ok(self.tables.lock().unwrap().branches.clone())
    }
}

#[async_trait]
impl AppointmentTypeStore for MemoryStore {
    async fn find_by_id(&self, appointment_type_id: Uuid) -> Result<Option<AppointmentType>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.types.iter().find(|x| x.appointment_type_id == appointment_type_id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<AppointmentType>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.types.iter().filter(|x| x.is_active).cloned().collect())
    }
}

#[async_trait]
impl HolidayStore for MemoryStore {
    async fn find_applicable(&self, branch_id: Uuid, date: NaiveDate) -> Result<Option<Holiday>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.holidays
            .iter()
            .filter(|h| h.applies_to(branch_id, date))
            .min_by_key(|h| h.holiday_type as i16)
            .cloned())
    }

    async fn list(&self, filter: &HolidayFilter) -> Result<Vec<Holiday>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        let mut out: Vec<Holiday> = t.holidays.iter().filter(|h| filter.matches(h)).cloned().collect();
        out.sort_by_key(|h| (h.holiday_date, h.holiday_type as i16));
        Ok(out)
    }

    async fn insert(&self, holiday: &Holiday) -> Result<Holiday, StoreError> {
        self.check_write()?;
        self.tables.lock().unwrap().holidays.push(holiday.clone());
        Ok(holiday.clone())
    }

    async fn deactivate(&self, holiday_id: Uuid) -> Result<Option<Holiday>, StoreError> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        Ok(t.holidays.iter_mut().find(|h| h.holiday_id == holiday_id).map(|h| {
            h.is_active = false;
            h.clone()
        }))
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.check_read()?;
        Ok(self.appointment(appointment_id))
    }

    async fn find_by_number(&self, appointment_number: &str) -> Result<Option<Appointment>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.appointments
            .iter()
            .find(|a| a.appointment_number == appointment_number)
            .cloned())
    }

    async fn list_by_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.appointments
            .iter()
            .filter(|a| a.client_id == client_id && a.is_active)
            .cloned()
            .collect())
    }

    async fn insert(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        self.check_write()?;
        self.tables.lock().unwrap().appointments.push(appointment.clone());
        Ok(appointment.clone())
    }

    async fn update_status(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        let row = t
            .appointments
            .iter_mut()
            .find(|a| a.appointment_id == appointment.appointment_id)
            .ok_or_else(|| StoreError::Backend("appointment vanished".into()))?;
        row.status = appointment.status;
        row.cancellation_reason = appointment.cancellation_reason.clone();
        row.completed_at = appointment.completed_at;
        row.updated_at = appointment.updated_at;
        Ok(row.clone())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        self.check_write()?;
        self.tables.lock().unwrap().notifications.push(notification.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        if let Some(n) = t.notifications.iter_mut().find(|n| n.notification_id == notification_id) {
            n.status = status;
            n.error_message = error_message;
            n.sent_at = sent_at;
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.notifications
            .iter()
            .filter(|n| n.recipient.user_id() == Some(user_id))
            .filter(|n| !unread_only || n.read_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check_write()?;
        let mut t = self.tables.lock().unwrap();
        match t
            .notifications
            .iter_mut()
            .find(|n| n.notification_id == notification_id && n.recipient.user_id() == Some(user_id))
        {
            Some(n) => {
                n.read_at.get_or_insert(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl StaffDirectory for MemoryStore {
    async fn users_for_appointment_type(&self, appointment_type_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.check_read()?;
        let t = self.tables.lock().unwrap();
        Ok(t.assignments.get(&appointment_type_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_active(&self, token_digest: &str) -> Result<Option<SessionPrincipal>, StoreError> {
        self.check_read()?;
        Ok(self.tables.lock().unwrap().sessions.get(token_digest).cloned())
    }

    async fn touch(&self, _session_token_id: Uuid) -> Result<(), StoreError> {
        Ok(())
    }
}

impl MemoryStore {
    pub fn stores(self: &std::sync::Arc<Self>) -> Stores {
        Stores {
            clients: self.clone(),
            branches: self.clone(),
            appointment_types: self.clone(),
            holidays: self.clone(),
            appointments: self.clone(),
            notifications: self.clone(),
            staff: self.clone(),
            sessions: self.clone(),
        }
    }
}
