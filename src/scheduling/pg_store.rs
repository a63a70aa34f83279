use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::*;
use crate::models::NotificationRow;

const CLIENT_COLUMNS: &str = r#"
    client_id, client_number, document_type, document_number, full_name,
    email, phone, mobile, address, is_active, created_at, updated_at
"#;

const HOLIDAY_COLUMNS: &str = "holiday_id, holiday_date, name, holiday_type, branch_id, is_active";

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, appointment_number, client_id, branch_id, appointment_type_id,
    appointment_date, appointment_time, status, notes, cancellation_reason,
    completed_at, is_enabled, is_active, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/* ============================================================
   clients
   ============================================================ */

#[async_trait]
impl ClientStore for PgStore {
    async fn find_by_document(&self, document_number: &str) -> Result<Option<Client>, StoreError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM client WHERE document_number = $1");
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(document_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id(&self, client_id: Uuid) -> Result<Option<Client>, StoreError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM client WHERE client_id = $1");
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert(&self, c: &Client) -> Result<Client, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO client ({CLIENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(c.client_id)
            .bind(&c.client_number)
            .bind(c.document_type)
            .bind(&c.document_number)
            .bind(&c.full_name)
            .bind(&c.email)
            .bind(&c.phone)
            .bind(&c.mobile)
            .bind(&c.address)
            .bind(c.is_active)
            .bind(c.created_at)
            .bind(c.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::unique("document_number"))?)
    }

    async fn set_active(&self, client_id: Uuid, active: bool) -> Result<Option<Client>, StoreError> {
        let sql = format!(
            r#"
            UPDATE client SET is_active = $2, updated_at = now()
            WHERE client_id = $1
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(client_id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/* ============================================================
   branches / appointment types / holidays
   ============================================================ */

#[async_trait]
impl BranchStore for PgStore {
    async fn find_by_id(&self, branch_id: Uuid) -> Result<Option<Branch>, StoreError> {
        Ok(sqlx::query_as::<_, Branch>(
            r#"
            SELECT branch_id, name, code, address, phone, city, state, is_main, is_active
            FROM branch
            WHERE branch_id = $1
            "#,
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_active(&self) -> Result<Vec<Branch>, StoreError> {
        Ok(sqlx::query_as::<_, Branch>(
            r#"
            SELECT branch_id, name, code, address, phone, city, state, is_main, is_active
            FROM branch
            WHERE is_active
            ORDER BY is_main DESC, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_all(&self) -> Result<Vec<Branch>, StoreError> {
        Ok(sqlx::query_as::<_, Branch>(
            r#"
            SELECT branch_id, name, code, address, phone, city, state, is_main, is_active
            FROM branch
            ORDER BY is_active DESC, is_main DESC, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl AppointmentTypeStore for PgStore {
    async fn find_by_id(&self, appointment_type_id: Uuid) -> Result<Option<AppointmentType>, StoreError> {
        Ok(sqlx::query_as::<_, AppointmentType>(
            r#"
            SELECT appointment_type_id, name, description, estimated_minutes, is_active
            FROM appointment_type
            WHERE appointment_type_id = $1
            "#,
        )
        .bind(appointment_type_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_active(&self) -> Result<Vec<AppointmentType>, StoreError> {
        Ok(sqlx::query_as::<_, AppointmentType>(
            r#"
            SELECT appointment_type_id, name, description, estimated_minutes, is_active
            FROM appointment_type
            WHERE is_active
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl HolidayStore for PgStore {
    async fn find_applicable(&self, branch_id: Uuid, date: NaiveDate) -> Result<Option<Holiday>, StoreError> {
        // national first, so the reported name is stable when both exist
        Ok(sqlx::query_as::<_, Holiday>(
            r#"
            SELECT holiday_id, holiday_date, name, holiday_type, branch_id, is_active
            FROM holiday
            WHERE holiday_date = $2
              AND is_active
              AND (holiday_type = 1 OR branch_id = $1)
            ORDER BY holiday_type
            LIMIT 1
            "#,
        )
        .bind(branch_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list(&self, filter: &HolidayFilter) -> Result<Vec<Holiday>, StoreError> {
        let sql = format!(
            r#"
            SELECT {HOLIDAY_COLUMNS}
            FROM holiday
            WHERE is_active
              AND ($1::date IS NULL OR holiday_date >= $1)
              AND ($2::date IS NULL OR holiday_date <= $2)
              AND ($3::uuid IS NULL OR holiday_type = 1 OR branch_id = $3)
            ORDER BY holiday_date, holiday_type
            LIMIT 500
            "#
        );
        Ok(sqlx::query_as::<_, Holiday>(&sql)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.branch_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert(&self, h: &Holiday) -> Result<Holiday, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO holiday ({HOLIDAY_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {HOLIDAY_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Holiday>(&sql)
            .bind(h.holiday_id)
            .bind(h.holiday_date)
            .bind(&h.name)
            .bind(h.holiday_type)
            .bind(h.branch_id)
            .bind(h.is_active)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn deactivate(&self, holiday_id: Uuid) -> Result<Option<Holiday>, StoreError> {
        let sql = format!("UPDATE holiday SET is_active = FALSE WHERE holiday_id = $1 RETURNING {HOLIDAY_COLUMNS}");
        Ok(sqlx::query_as::<_, Holiday>(&sql)
            .bind(holiday_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/* ============================================================
   appointments
   ============================================================ */

#[async_trait]
impl AppointmentStore for PgStore {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = $1");
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(appointment_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_number(&self, appointment_number: &str) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_number = $1");
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(appointment_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_by_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let sql = format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS} FROM appointment
            WHERE client_id = $1 AND is_active
            ORDER BY appointment_date DESC, appointment_time DESC
            "#
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert(&self, a: &Appointment) -> Result<Appointment, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO appointment ({APPOINTMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(a.appointment_id)
            .bind(&a.appointment_number)
            .bind(a.client_id)
            .bind(a.branch_id)
            .bind(a.appointment_type_id)
            .bind(a.appointment_date)
            .bind(&a.appointment_time)
            .bind(a.status)
            .bind(&a.notes)
            .bind(&a.cancellation_reason)
            .bind(a.completed_at)
            .bind(a.is_enabled)
            .bind(a.is_active)
            .bind(a.created_at)
            .bind(a.updated_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_status(&self, a: &Appointment) -> Result<Appointment, StoreError> {
        let sql = format!(
            r#"
            UPDATE appointment
            SET status = $2,
                cancellation_reason = $3,
                completed_at = $4,
                updated_at = $5
            WHERE appointment_id = $1
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(a.appointment_id)
            .bind(a.status)
            .bind(&a.cancellation_reason)
            .bind(a.completed_at)
            .bind(a.updated_at)
            .fetch_one(&self.pool)
            .await?)
    }
}

/* ============================================================
   notification ledger
   ============================================================ */

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, n: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notification (
                notification_id, channel, title, message, status, error_message,
                user_id, client_id, appointment_id, sent_at, read_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(n.notification_id)
        .bind(n.channel)
        .bind(&n.title)
        .bind(&n.message)
        .bind(n.status)
        .bind(&n.error_message)
        .bind(n.recipient.user_id())
        .bind(n.recipient.client_id())
        .bind(n.appointment_id)
        .bind(n.sent_at)
        .bind(n.read_at)
        .bind(n.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE notification
            SET status = $2, error_message = $3, sent_at = $4
            WHERE notification_id = $1
            "#,
        )
        .bind(notification_id)
        .bind(status)
        .bind(error_message)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT notification_id, channel, title, message, status, error_message,
                   user_id, client_id, appointment_id, sent_at, read_at, created_at
            FROM notification
            WHERE user_id = $1
              AND ($2 = FALSE OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT 200
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Notification::try_from(r).map_err(StoreError::Backend))
            .collect()
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE notification
            SET read_at = COALESCE(read_at, $3)
            WHERE notification_id = $1 AND user_id = $2
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl StaffDirectory for PgStore {
    async fn users_for_appointment_type(&self, appointment_type_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT u.user_id
            FROM user_appointment_type uat
            JOIN app_user u ON u.user_id = uat.user_id
            WHERE uat.appointment_type_id = $1 AND u.is_active
            "#,
        )
        .bind(appointment_type_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

/* ============================================================
   staff sessions
   ============================================================ */

#[async_trait]
impl SessionStore for PgStore {
    async fn find_active(&self, token_digest: &str) -> Result<Option<SessionPrincipal>, StoreError> {
        Ok(sqlx::query_as::<_, SessionPrincipal>(
            r#"
            SELECT st.session_token_id, st.user_id, u.roles
            FROM session_token st
            JOIN app_user u ON u.user_id = st.user_id
            WHERE st.session_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.expires_at > now()
              AND u.is_active
            "#,
        )
        .bind(token_digest)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn touch(&self, session_token_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE session_token SET last_seen_at = now() WHERE session_token_id = $1")
            .bind(session_token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
