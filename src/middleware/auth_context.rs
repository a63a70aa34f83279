use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::token_digest;
use crate::error::ApiError;
use crate::models::{AppState, Role};

/// Authenticated staff session.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    pub session_token_id: Uuid,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let session = state
                .stores
                .sessions
                .find_active(&token_digest(authz.token()))
                .await
                .map_err(|e| ApiError::Internal(format!("session lookup failed: {e}")))?
                .ok_or_else(ApiError::session_expired)?;

            // best-effort
            if let Err(e) = state.stores.sessions.touch(session.session_token_id).await {
                tracing::debug!(error = %e, "could not record session activity");
            }

            Ok(AuthContext {
                user_id: session.user_id,
                role: session.roles,
                session_token_id: session.session_token_id,
            })
        }
    }
}
