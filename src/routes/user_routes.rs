use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::{ApiError, FieldError},
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Role},
    permissions::{Capability, Resource, ensure_capability},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StaffUserRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub roles: Role,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct AssignTypesRequest {
    pub appointment_type_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentsData {
    pub user_id: Uuid,
    pub appointment_type_ids: Vec<Uuid>,
}

const USER_COLUMNS: &str = "user_id, username, display_name, email, roles, is_active, created_at";

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/users
        .route("/", get(list_users).post(create_user))
        .route("/{user_id}", get(get_user))
        .route("/{user_id}/disable", post(disable_user))
        .route("/{user_id}/enable", post(enable_user))
        // which appointment types a staff member handles
        .route(
            "/{user_id}/appointment-types",
            put(assign_appointment_types).get(list_assignments),
        )
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("NOT_FOUND", "user not found".into())
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<StaffUserRow>>>, ApiError> {
    ensure_capability(&auth, Resource::Users, Capability::Read)?;

    let sql = format!("SELECT {USER_COLUMNS} FROM app_user ORDER BY created_at DESC LIMIT 200");
    let users = sqlx::query_as::<_, StaffUserRow>(&sql)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;
    Ok(Json(ApiOk { data: users }))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<StaffUserRow>>, ApiError> {
    ensure_capability(&auth, Resource::Users, Capability::Read)?;

    let sql = format!("SELECT {USER_COLUMNS} FROM app_user WHERE user_id = $1");
    let user = sqlx::query_as::<_, StaffUserRow>(&sql)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(user_not_found)?;
    Ok(Json(ApiOk { data: user }))
}

fn validate_new_user(req: &CreateUserRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.username.trim().len() < 3 {
        errors.push(FieldError::new("username", "username must be at least 3 characters"));
    }
    if req.display_name.trim().is_empty() {
        errors.push(FieldError::new("display_name", "display_name is required"));
    }
    if req.password.trim().len() < 8 {
        errors.push(FieldError::new("password", "password must be at least 8 characters"));
    }
    errors
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(req), _): WithRejection<Json<CreateUserRequest>, ApiError>,
) -> Result<(StatusCode, Json<ApiOk<StaffUserRow>>), ApiError> {
    ensure_capability(&auth, Resource::Users, Capability::Create)?;
    if req.role == Role::Admin && auth.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only an admin can create admin accounts".into(),
        ));
    }

    let errors = validate_new_user(&req);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let pw_hash = hash_password(req.password.trim()).map_err(ApiError::Internal)?;
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let sql = format!(
        r#"
        INSERT INTO app_user (username, display_name, email, password_hash, roles)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {USER_COLUMNS}
        "#
    );
    let user = sqlx::query_as::<_, StaffUserRow>(&sql)
        .bind(req.username.trim())
        .bind(req.display_name.trim())
        .bind(email)
        .bind(&pw_hash)
        .bind(req.role)
        .fetch_one(&state.db)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return ApiError::Conflict("USERNAME_TAKEN", "username already exists".into());
                }
            }
            ApiError::db(e)
        })?;

    tracing::info!(user_id = %user.user_id, role = ?user.roles, "staff user created");
    Ok((StatusCode::CREATED, Json(ApiOk { data: user })))
}

async fn set_active(state: &AppState, user_id: Uuid, active: bool) -> Result<StaffUserRow, ApiError> {
    let sql = format!("UPDATE app_user SET is_active = $2 WHERE user_id = $1 RETURNING {USER_COLUMNS}");
    let user = sqlx::query_as::<_, StaffUserRow>(&sql)
        .bind(user_id)
        .bind(active)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(user_not_found)?;

    if !active {
        sqlx::query("UPDATE session_token SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL")
            .bind(user_id)
            .execute(&state.db)
            .await
            .map_err(ApiError::db)?;
    }
    Ok(user)
}

pub async fn disable_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<StaffUserRow>>, ApiError> {
    ensure_capability(&auth, Resource::Users, Capability::Update)?;
    if user_id == auth.user_id {
        return Err(ApiError::BadRequest("BUSINESS_RULE", "You cannot disable your own account".into()));
    }
    Ok(Json(ApiOk { data: set_active(&state, user_id, false).await? }))
}

pub async fn enable_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<StaffUserRow>>, ApiError> {
    ensure_capability(&auth, Resource::Users, Capability::Update)?;
    Ok(Json(ApiOk { data: set_active(&state, user_id, true).await? }))
}

async fn load_assignments(state: &AppState, user_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT appointment_type_id
        FROM user_appointment_type
        WHERE user_id = $1
        ORDER BY appointment_type_id
        "#,
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)
}

pub async fn list_assignments(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<AssignmentsData>>, ApiError> {
    ensure_capability(&auth, Resource::Users, Capability::Read)?;
    let appointment_type_ids = load_assignments(&state, user_id).await?;
    Ok(Json(ApiOk { data: AssignmentsData { user_id, appointment_type_ids } }))
}

/// Replaces the full set of appointment types routed to this user's inbox.
pub async fn assign_appointment_types(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    WithRejection(Json(req), _): WithRejection<Json<AssignTypesRequest>, ApiError>,
) -> Result<Json<ApiOk<AssignmentsData>>, ApiError> {
    ensure_capability(&auth, Resource::Users, Capability::Update)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let exists: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM app_user WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ApiError::db)?;
    if exists.is_none() {
        return Err(user_not_found());
    }

    sqlx::query("DELETE FROM user_appointment_type WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    sqlx::query(
        r#"
        INSERT INTO user_appointment_type (user_id, appointment_type_id)
        SELECT $1, t.appointment_type_id
        FROM appointment_type t
        WHERE t.appointment_type_id = ANY($2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(req.appointment_type_ids)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    let appointment_type_ids = load_assignments(&state, user_id).await?;
    Ok(Json(ApiOk { data: AssignmentsData { user_id, appointment_type_ids } }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, display_name: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            display_name: display_name.into(),
            email: None,
            password: password.into(),
            role: Role::Agent,
        }
    }

    #[test]
    fn valid_new_user_has_no_errors() {
        assert!(validate_new_user(&request("mlopez", "Maria Lopez", "password123")).is_empty());
    }

    #[test]
    fn every_bad_field_is_reported() {
        let errors = validate_new_user(&request("  a ", " ", "short"));
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["username", "display_name", "password"]);
    }

    #[test]
    fn whitespace_does_not_count_towards_password_length() {
        let errors = validate_new_user(&request("mlopez", "Maria", "   1234   "));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "password");
    }
}
