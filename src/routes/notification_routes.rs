use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Notification, OkData},
    permissions::{Capability, Resource, ensure_capability},
    scheduling::SchedulingError,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_my_notifications))
        .route("/notifications/{notification_id}/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// In-app inbox of the signed-in staff user.
pub async fn list_my_notifications(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<InboxQuery>,
) -> Result<Json<ApiOk<Vec<Notification>>>, ApiError> {
    ensure_capability(&auth, Resource::Notifications, Capability::Read)?;
    let list = state
        .stores
        .notifications
        .list_for_user(auth.user_id, q.unread_only)
        .await
        .map_err(SchedulingError::operation("listing notifications"))?;
    Ok(Json(ApiOk { data: list }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_capability(&auth, Resource::Notifications, Capability::Update)?;
    let found = state
        .stores
        .notifications
        .mark_read(notification_id, auth.user_id, Utc::now())
        .await
        .map_err(SchedulingError::operation("updating notification"))?;
    if !found {
        return Err(ApiError::NotFound("NOT_FOUND", "Notification not found".into()));
    }
    Ok(Json(ApiOk { data: OkData { ok: true } }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::models::{NotificationChannel, Recipient, Role};
    use crate::routes::test_support::test_app;

    use super::*;

    fn in_app(user_id: Uuid, title: &str) -> Notification {
        Notification::pending(
            NotificationChannel::InApp,
            Recipient::User(user_id),
            None,
            title.to_string(),
            "Nueva cita asignada".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn inbox_lists_only_the_callers_notifications() {
        let app = test_app();
        let (me, token) = app.sign_in(Role::Agent);
        let (someone_else, _) = app.sign_in(Role::Agent);
        app.store.put_notification(in_app(me, "Cita APT-1"));
        app.store.put_notification(in_app(me, "Cita APT-2"));
        app.store.put_notification(in_app(someone_else, "Cita APT-3"));

        let (status, body) = app.call(Method::GET, "/api/v1/notifications", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Cita APT-1", "Cita APT-2"]);
    }

    #[tokio::test]
    async fn mark_read_only_touches_the_callers_notifications() {
        let app = test_app();
        let (me, token) = app.sign_in(Role::Agent);
        let (someone_else, _) = app.sign_in(Role::Manager);
        let mine = in_app(me, "Cita APT-1");
        let theirs = in_app(someone_else, "Cita APT-2");
        app.store.put_notification(mine.clone());
        app.store.put_notification(theirs.clone());

        let uri = format!("/api/v1/notifications/{}/read", theirs.notification_id);
        let (status, _) = app.call(Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/v1/notifications/{}/read", mine.notification_id);
        let (status, body) = app.call(Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ok"], true);

        let stored = app.store.notifications();
        let read_at = |id: Uuid| stored.iter().find(|n| n.notification_id == id).unwrap().read_at;
        assert!(read_at(mine.notification_id).is_some());
        assert!(read_at(theirs.notification_id).is_none());

        let (_, body) = app
            .call(Method::GET, "/api/v1/notifications?unread_only=true", Some(&token), None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn inbox_requires_a_session() {
        let app = test_app();
        let (status, body) = app.call(Method::GET, "/api/v1/notifications", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
    }
}
