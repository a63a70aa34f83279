use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Client},
    permissions::{Capability, Resource, ensure_capability},
    scheduling::SchedulingError,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients/{client_id}", get(get_client))
        .route("/clients/by-document/{document_number}", get(get_client_by_document))
        // clients are never deleted
        .route("/clients/{client_id}/deactivate", post(deactivate_client))
        .route("/clients/{client_id}/activate", post(activate_client))
}

fn client_not_found() -> ApiError {
    ApiError::NotFound("NOT_FOUND", "Client not found".into())
}

pub async fn get_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ApiOk<Client>>, ApiError> {
    ensure_capability(&auth, Resource::Clients, Capability::Read)?;
    let client = state
        .stores
        .clients
        .find_by_id(client_id)
        .await
        .map_err(SchedulingError::operation("loading client"))?
        .ok_or_else(client_not_found)?;
    Ok(Json(ApiOk { data: client }))
}

pub async fn get_client_by_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_number): Path<String>,
) -> Result<Json<ApiOk<Client>>, ApiError> {
    ensure_capability(&auth, Resource::Clients, Capability::Read)?;
    let client = state
        .stores
        .clients
        .find_by_document(document_number.trim())
        .await
        .map_err(SchedulingError::operation("loading client"))?
        .ok_or_else(client_not_found)?;
    Ok(Json(ApiOk { data: client }))
}

async fn set_active(
    state: &AppState,
    auth: &AuthContext,
    client_id: Uuid,
    active: bool,
) -> Result<Json<ApiOk<Client>>, ApiError> {
    ensure_capability(auth, Resource::Clients, Capability::Update)?;
    let client = state
        .stores
        .clients
        .set_active(client_id, active)
        .await
        .map_err(SchedulingError::operation("updating client"))?
        .ok_or_else(client_not_found)?;
    tracing::info!(%client_id, active, "client activation changed");
    Ok(Json(ApiOk { data: client }))
}

pub async fn deactivate_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ApiOk<Client>>, ApiError> {
    set_active(&state, &auth, client_id, false).await
}

pub async fn activate_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ApiOk<Client>>, ApiError> {
    set_active(&state, &auth, client_id, true).await
}
