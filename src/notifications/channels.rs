use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use super::{AppointmentPayload, NotificationEvent};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("notification service connection error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification service failed. Status: {status}, Body: {body}")]
    Rejected { status: u16, body: String },
    #[error("WhatsApp service not ready")]
    NotReady,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        event: &NotificationEvent,
        email: &str,
        payload: &AppointmentPayload,
    ) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    /// Whether the WhatsApp session behind the gateway is connected.
    async fn is_ready(&self) -> bool;

    async fn send(
        &self,
        event: &NotificationEvent,
        phone_number: &str,
        payload: &AppointmentPayload,
    ) -> Result<(), ChannelError>;
}

#[derive(Serialize)]
struct EmailEnvelope<'a> {
    email: &'a str,
    data: &'a AppointmentPayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WhatsAppEnvelope<'a> {
    phone_number: &'a str,
    data: &'a AppointmentPayload,
}

#[derive(Deserialize)]
struct StatusBody {
    ready: bool,
}

/// HTTP client for the Gmail and WhatsApp sender services.
pub struct HttpNotificationGateway {
    client: Client,
    base_url: String,
}

impl HttpNotificationGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: String, body: &T) -> Result<(), ChannelError> {
        debug!(%url, "posting notification");
        let res = self.client.post(&url).json(body).send().await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            let err = ChannelError::Rejected { status, body };
            error!(%url, "{err}");
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl EmailSender for HttpNotificationGateway {
    async fn send(
        &self,
        event: &NotificationEvent,
        email: &str,
        payload: &AppointmentPayload,
    ) -> Result<(), ChannelError> {
        let url = format!("{}/gmail/{}", self.base_url, event.slug());
        self.post(url, &EmailEnvelope { email, data: payload }).await
    }
}

#[async_trait]
impl WhatsAppSender for HttpNotificationGateway {
    async fn is_ready(&self) -> bool {
        let url = format!("{}/whatsapp/status", self.base_url);
        match self.client.get(&url).send().await {
            Ok(res) if res.status().is_success() => {
                res.json::<StatusBody>().await.map(|b| b.ready).unwrap_or(false)
            }
            Ok(res) => {
                debug!(status = %res.status(), "WhatsApp status check failed");
                false
            }
            Err(e) => {
                debug!("WhatsApp status check error: {e}");
                false
            }
        }
    }

    async fn send(
        &self,
        event: &NotificationEvent,
        phone_number: &str,
        payload: &AppointmentPayload,
    ) -> Result<(), ChannelError> {
        let url = format!("{}/whatsapp/{}", self.base_url, event.slug());
        self.post(url, &WhatsAppEnvelope { phone_number, data: payload }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_match_the_sender_services() {
        let payload = AppointmentPayload {
            client_name: "Ana".into(),
            appointment_date: "26/10/2026".into(),
            appointment_time: "10:00".into(),
            location: "Sede Centro".into(),
            address: "Calle 7".into(),
            appointment_number: "APT-20261019-AB12CD34".into(),
            reason: None,
        };
        let wa = serde_json::to_value(WhatsAppEnvelope { phone_number: "+573001234567", data: &payload }).unwrap();
        assert_eq!(wa["phoneNumber"], "+573001234567");
        assert_eq!(wa["data"]["appointmentNumber"], "APT-20261019-AB12CD34");
        assert!(wa["data"].get("reason").is_none());

        let em = serde_json::to_value(EmailEnvelope { email: "ana@example.com", data: &payload }).unwrap();
        assert_eq!(em["email"], "ana@example.com");
        assert_eq!(em["data"]["clientName"], "Ana");
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let g = HttpNotificationGateway::new("http://localhost:3001/");
        assert_eq!(g.base_url, "http://localhost:3001");
    }
}
