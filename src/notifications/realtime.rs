//! In-process fan-out of staff events to open WebSocket sessions.

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    AppointmentCreated {
        appointment_id: Uuid,
        appointment_number: String,
        branch_id: Uuid,
        appointment_date: NaiveDate,
        appointment_time: String,
    },
    Notification {
        notification_id: Uuid,
        title: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct Addressed {
    pub user_id: Uuid,
    pub event: RealtimeEvent,
}

#[derive(Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<Addressed>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Returns how many sessions saw the event; zero when nobody is connected.
    pub fn publish(&self, user_id: Uuid, event: RealtimeEvent) -> usize {
        self.tx.send(Addressed { user_id, event }).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Addressed> {
        self.tx.subscribe()
    }
}
