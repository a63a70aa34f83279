//! Best-effort fan-out of appointment events to email, WhatsApp and staff inboxes.
//!
//! Delivery is at-most-once: each channel attempt is written to the
//! `notification` ledger as pending, then flipped to sent or failed. Nothing
//! here is retried and nothing here can fail the booking or cancellation that
//! triggered it; errors end up in the log.

pub mod channels;
pub mod phone;
pub mod realtime;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::ChannelSettings;
use crate::models::{
    Appointment, Branch, Client, Notification, NotificationChannel, NotificationStatus, Recipient,
};
use crate::scheduling::{SchedulingError, Stores};
use channels::{ChannelError, EmailSender, WhatsAppSender};
use realtime::{RealtimeEvent, RealtimeHub};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Confirmation,
    Reminder,
    Cancellation { reason: Option<String> },
}

impl NotificationEvent {
    /// Path segment understood by the sender services.
    pub fn slug(&self) -> &'static str {
        match self {
            NotificationEvent::Confirmation => "appointment-confirmation",
            NotificationEvent::Reminder => "appointment-reminder",
            NotificationEvent::Cancellation { .. } => "appointment-cancellation",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            NotificationEvent::Confirmation => "Appointment scheduled",
            NotificationEvent::Reminder => "Appointment reminder",
            NotificationEvent::Cancellation { .. } => "Appointment cancelled",
        }
    }
}

/// Channel-agnostic body sent to every sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPayload {
    pub client_name: String,
    /// `dd/MM/yyyy`
    pub appointment_date: String,
    pub appointment_time: String,
    pub location: String,
    pub address: String,
    pub appointment_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AppointmentPayload {
    pub fn build(client: &Client, branch: &Branch, appointment: &Appointment, event: &NotificationEvent) -> Self {
        let reason = match event {
            NotificationEvent::Cancellation { reason } => {
                Some(reason.clone().unwrap_or_else(|| "Not specified".to_string()))
            }
            _ => None,
        };
        Self {
            client_name: client.full_name.clone(),
            appointment_date: appointment.appointment_date.format("%d/%m/%Y").to_string(),
            appointment_time: appointment.appointment_time.clone(),
            location: branch.name.clone(),
            address: branch.address.clone(),
            appointment_number: appointment.appointment_number.clone(),
            reason,
        }
    }

    fn summary(&self) -> String {
        let mut s = format!(
            "Appointment {} for {} on {} at {}, {}",
            self.appointment_number, self.client_name, self.appointment_date, self.appointment_time, self.location
        );
        if let Some(r) = &self.reason {
            s.push_str(&format!(". Reason: {r}"));
        }
        s
    }
}

/// Outcome per channel; `None` means the channel was not attempted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub email: Option<NotificationStatus>,
    pub whatsapp: Option<NotificationStatus>,
    pub in_app: usize,
}

pub struct NotificationDispatcher {
    stores: Stores,
    email: Arc<dyn EmailSender>,
    whatsapp: Arc<dyn WhatsAppSender>,
    realtime: RealtimeHub,
    settings: Arc<dyn ChannelSettings>,
    country_code: String,
}

impl NotificationDispatcher {
    pub fn new(
        stores: Stores,
        email: Arc<dyn EmailSender>,
        whatsapp: Arc<dyn WhatsAppSender>,
        realtime: RealtimeHub,
        settings: Arc<dyn ChannelSettings>,
        country_code: String,
    ) -> Self {
        Self { stores, email, whatsapp, realtime, settings, country_code }
    }

    /// Detached dispatch. The handle exists for tests; request handlers drop it.
    pub fn spawn(self: &Arc<Self>, appointment_id: Uuid, event: NotificationEvent) -> JoinHandle<DispatchReport> {
        let this = self.clone();
        let span = info_span!("notification_dispatch", %appointment_id, event = event.slug());
        tokio::spawn(async move { this.dispatch(appointment_id, event).await }.instrument(span))
    }

    /// Same as `spawn`, preceded by the real-time "new appointment" push.
    pub fn spawn_booking(self: &Arc<Self>, appointment: Appointment) -> JoinHandle<DispatchReport> {
        let this = self.clone();
        let appointment_id = appointment.appointment_id;
        let span = info_span!("booking_side_effects", %appointment_id);
        tokio::spawn(
            async move {
                this.announce_new_appointment(&appointment).await;
                this.dispatch(appointment_id, NotificationEvent::Confirmation).await
            }
            .instrument(span),
        )
    }

    /// Never fails; problems are logged and reflected in the report.
    pub async fn dispatch(&self, appointment_id: Uuid, event: NotificationEvent) -> DispatchReport {
        match self.try_dispatch(appointment_id, &event).await {
            Ok(report) => {
                info!(?report, "notification dispatch finished");
                report
            }
            Err(e) => {
                error!(%appointment_id, "notification dispatch aborted: {e}");
                DispatchReport::default()
            }
        }
    }

    /// Pushes a new-appointment event to staff assigned to its type.
    pub async fn announce_new_appointment(&self, appointment: &Appointment) -> usize {
        if !self.settings.current().realtime {
            return 0;
        }
        let users = match self
            .stores
            .staff
            .users_for_appointment_type(appointment.appointment_type_id)
            .await
        {
            Ok(u) => u,
            Err(e) => {
                warn!("could not load assigned staff: {e}");
                return 0;
            }
        };
        for user_id in &users {
            self.realtime.publish(
                *user_id,
                RealtimeEvent::AppointmentCreated {
                    appointment_id: appointment.appointment_id,
                    appointment_number: appointment.appointment_number.clone(),
                    branch_id: appointment.branch_id,
                    appointment_date: appointment.appointment_date,
                    appointment_time: appointment.appointment_time.clone(),
                },
            );
        }
        users.len()
    }

    async fn try_dispatch(&self, appointment_id: Uuid, event: &NotificationEvent) -> Result<DispatchReport, SchedulingError> {
        // Flags are re-read on every dispatch.
        let flags = self.settings.current();
        let appointment = self
            .stores
            .appointments
            .find_by_id(appointment_id)
            .await
            .map_err(SchedulingError::operation("loading notification data"))?
            .ok_or_else(|| SchedulingError::NotFound("Appointment not found".into()))?;
        let client = self
            .stores
            .clients
            .find_by_id(appointment.client_id)
            .await
            .map_err(SchedulingError::operation("loading notification data"))?
            .ok_or_else(|| SchedulingError::NotFound("Client not found".into()))?;
        let branch = self
            .stores
            .branches
            .find_by_id(appointment.branch_id)
            .await
            .map_err(SchedulingError::operation("loading notification data"))?
            .ok_or_else(|| SchedulingError::NotFound("Branch not found".into()))?;

        let payload = AppointmentPayload::build(&client, &branch, &appointment, event);
        let title = event.title().to_string();
        let message = payload.summary();
        let client_recipient = Recipient::Client(client.client_id);
        let mut report = DispatchReport::default();

        let email = client.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        match (flags.email, email) {
            (true, Some(address)) => {
                let status = self
                    .deliver(
                        NotificationChannel::Email,
                        client_recipient,
                        appointment_id,
                        &title,
                        &message,
                        self.email.send(event, address, &payload),
                    )
                    .await;
                report.email = Some(status);
            }
            (false, _) => info!("email channel disabled"),
            (true, None) => info!("client has no email; skipping email channel"),
        }

        let phone = client
            .contact_phone()
            .and_then(|p| phone::to_international(p, &self.country_code));
        match (flags.whatsapp, phone) {
            (true, Some(number)) => {
                let attempt = async {
                    if !self.whatsapp.is_ready().await {
                        return Err(ChannelError::NotReady);
                    }
                    self.whatsapp.send(event, &number, &payload).await
                };
                let status = self
                    .deliver(
                        NotificationChannel::WhatsApp,
                        client_recipient,
                        appointment_id,
                        &title,
                        &message,
                        attempt,
                    )
                    .await;
                report.whatsapp = Some(status);
            }
            (false, _) => info!("WhatsApp channel disabled"),
            (true, None) => info!("client phone cannot be normalised; skipping WhatsApp channel"),
        }

        report.in_app = self
            .deliver_in_app(&appointment, &title, &message, flags.realtime)
            .await;

        Ok(report)
    }

    async fn deliver_in_app(&self, appointment: &Appointment, title: &str, message: &str, push: bool) -> usize {
        let users = match self
            .stores
            .staff
            .users_for_appointment_type(appointment.appointment_type_id)
            .await
        {
            Ok(u) => u,
            Err(e) => {
                warn!("could not load assigned staff: {e}");
                return 0;
            }
        };

        let mut delivered = 0;
        for user_id in users {
            let realtime = &self.realtime;
            let status = self
                .deliver_with_id(
                    NotificationChannel::InApp,
                    Recipient::User(user_id),
                    appointment.appointment_id,
                    title,
                    message,
                    |notification_id| async move {
                        if push {
                            realtime.publish(
                                user_id,
                                RealtimeEvent::Notification {
                                    notification_id,
                                    title: title.to_string(),
                                    message: message.to_string(),
                                },
                            );
                        }
                        Ok::<(), ChannelError>(())
                    },
                )
                .await;
            if status == NotificationStatus::Sent {
                delivered += 1;
            }
        }
        delivered
    }

    async fn deliver<F>(
        &self,
        channel: NotificationChannel,
        recipient: Recipient,
        appointment_id: Uuid,
        title: &str,
        message: &str,
        attempt: F,
    ) -> NotificationStatus
    where
        F: Future<Output = Result<(), ChannelError>>,
    {
        self.deliver_with_id(channel, recipient, appointment_id, title, message, |_| attempt)
            .await
    }

    /// Ledger row first, then the attempt, then the final status.
    async fn deliver_with_id<F, Fut>(
        &self,
        channel: NotificationChannel,
        recipient: Recipient,
        appointment_id: Uuid,
        title: &str,
        message: &str,
        attempt: F,
    ) -> NotificationStatus
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = Result<(), ChannelError>>,
    {
        let record = Notification::pending(
            channel,
            recipient,
            Some(appointment_id),
            title.to_string(),
            message.to_string(),
            Utc::now(),
        );
        let id = record.notification_id;
        if let Err(e) = self.stores.notifications.insert(&record).await {
            error!(?channel, "could not record notification: {e}");
        }

        let (status, error_message, sent_at) = match attempt(id).await {
            Ok(()) => (NotificationStatus::Sent, None, Some(Utc::now())),
            Err(e) => {
                warn!(?channel, "notification delivery failed: {e}");
                (NotificationStatus::Failed, Some(e.to_string()), None)
            }
        };

        if let Err(e) = self
            .stores
            .notifications
            .set_status(id, status, error_message, sent_at)
            .await
        {
            error!(?channel, "could not update notification status: {e}");
        }
        status
    }
}
