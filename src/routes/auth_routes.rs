use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{issue_session_token, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

const USER_SELECT: &str = r#"
    SELECT user_id, username, display_name, password_hash, roles, is_active
    FROM app_user
"#;

async fn load_user_by_username(state: &AppState, username: &str) -> Result<Option<UserRow>, ApiError> {
    sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE username = $1"))
        .bind(username)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)
}

async fn load_user_by_id(state: &AppState, user_id: Uuid) -> Result<Option<UserRow>, ApiError> {
    sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE user_id = $1"))
        .bind(user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<Json<ApiOk<LoginResponseData>>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username and password are required".into(),
        ));
    }

    let user = load_user_by_username(&state, username)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()));
    }
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let issued = issue_session_token();
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token (user_id, session_token_hash, device_name, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(user.user_id)
    .bind(&issued.digest)
    .bind(req.device_name.as_deref())
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    info!(user_id = %user.user_id, "staff login");

    Ok(Json(ApiOk {
        data: LoginResponseData {
            access_token: issued.token,
            expires_at: session.expires_at,
            user: UserProfile {
                user_id: user.user_id,
                username: user.username,
                display_name: user.display_name,
                role: user.roles,
            },
        },
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeResponseData>>, ApiError> {
    let user = load_user_by_id(&state, auth.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(ApiError::session_expired)?;

    let session = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        SELECT session_token_id, expires_at
        FROM session_token
        WHERE session_token_id = $1
          AND revoked_at IS NULL
          AND expires_at > now()
        "#,
    )
    .bind(auth.session_token_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk {
        data: MeResponseData {
            user: UserProfile {
                user_id: user.user_id,
                username: user.username,
                display_name: user.display_name,
                role: user.roles,
            },
            session: SessionInfo {
                session_token_id: session.session_token_id,
                expires_at: session.expires_at,
            },
        },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let rows = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if rows.rows_affected() == 0 {
        return Err(ApiError::session_expired());
    }
    Ok(Json(ApiOk { data: OkData { ok: true } }))
}
