use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::{CLIENT_NUMBER_PREFIX, ClientStore, SchedulingError, StoreError, generate_number};
use crate::models::{Client, DocumentType};

/// Contact data submitted with a booking.
#[derive(Debug, Clone)]
pub struct ClientDetails {
    pub document_type: DocumentType,
    pub document_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
}

pub struct ClientResolver {
    clients: Arc<dyn ClientStore>,
}

impl ClientResolver {
    pub fn new(clients: Arc<dyn ClientStore>) -> Self {
        Self { clients }
    }

    /// Returns the client owning `document_number`, creating it on first sight.
    /// An existing record is returned as stored; booking data never overwrites it.
    pub async fn resolve(&self, details: ClientDetails, now: DateTime<Utc>) -> Result<Client, SchedulingError> {
        let document_number = details.document_number.trim().to_string();

        let existing = self
            .clients
            .find_by_document(&document_number)
            .await
            .map_err(SchedulingError::operation("looking up client"))?;
        if let Some(client) = existing {
            return Ok(client);
        }

        let client = Client {
            client_id: Uuid::new_v4(),
            client_number: generate_number(CLIENT_NUMBER_PREFIX, now),
            document_type: details.document_type,
            document_number,
            full_name: details.full_name.trim().to_string(),
            email: non_blank(details.email),
            phone: non_blank(details.phone),
            mobile: non_blank(details.mobile),
            address: non_blank(details.address),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match self.clients.insert(&client).await {
            Ok(created) => {
                info!(client_number = %created.client_number, "client created");
                Ok(created)
            }
            // another booking created the same document first
            Err(StoreError::Duplicate(key)) => self
                .clients
                .find_by_document(&client.document_number)
                .await
                .map_err(SchedulingError::operation("looking up client"))?
                .ok_or(StoreError::Duplicate(key))
                .map_err(SchedulingError::operation("creating client")),
            Err(e) => Err(SchedulingError::operation("creating client")(e)),
        }
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
