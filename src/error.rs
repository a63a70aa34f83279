use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::scheduling::SchedulingError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// One failed input rule, keyed by the request field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    Validation(Vec<FieldError>),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    ServiceUnavailable(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Username or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn db(e: sqlx::Error) -> Self {
        ApiError::Internal(format!("db error: {e}"))
    }

    fn to_error_response(code: &str, message: &str, fields: Vec<FieldError>) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
                fields,
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, msg, fields) = match self {
            ApiError::Unauthorized(code, msg) => (StatusCode::UNAUTHORIZED, code, msg, vec![]),
            ApiError::Forbidden(code, msg) => (StatusCode::FORBIDDEN, code, msg, vec![]),
            ApiError::BadRequest(code, msg) => (StatusCode::BAD_REQUEST, code, msg, vec![]),
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "One or more fields are invalid".to_string(),
                fields,
            ),
            ApiError::NotFound(code, msg) => (StatusCode::NOT_FOUND, code, msg, vec![]),
            ApiError::Conflict(code, msg) => (StatusCode::CONFLICT, code, msg, vec![]),
            ApiError::ServiceUnavailable(code, msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, code, msg, vec![])
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg, vec![])
            }
        };

        (status, ApiError::to_error_response(code, &msg, fields)).into_response()
    }
}

impl From<SchedulingError> for ApiError {
    fn from(e: SchedulingError) -> Self {
        match e {
            SchedulingError::Validation(fields) => ApiError::Validation(fields),
            SchedulingError::Rejected(reason) => ApiError::BadRequest("BUSINESS_RULE", reason),
            SchedulingError::DateNotBookable(r) => ApiError::BadRequest("DATE_NOT_BOOKABLE", r.to_string()),
            SchedulingError::NotFound(msg) => ApiError::NotFound("NOT_FOUND", msg),
            SchedulingError::Unavailable(msg) => ApiError::ServiceUnavailable("BRANCH_UNAVAILABLE", msg),
            e @ SchedulingError::Operation { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

const JSON_DATA_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// A body serde could not read is reported like any other invalid field.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(vec![body_field_error(&rejection.body_text())])
    }
}

/// Pulls the offending field out of a rejection text such as
/// `branch_id: UUID parsing failed` or ``missing field `full_name` at line 1``.
fn body_field_error(text: &str) -> FieldError {
    let Some(detail) = text.strip_prefix(JSON_DATA_PREFIX) else {
        return FieldError::new("body", text);
    };
    let (path, message) = match detail.split_once(": ") {
        Some((path, rest)) if !path.contains(char::is_whitespace) => (Some(path), rest),
        _ => (None, detail),
    };
    let missing = message
        .strip_prefix("missing field `")
        .and_then(|m| m.split_once('`'))
        .map(|(name, _)| name);

    let field = match (path, missing) {
        (Some(p), Some(m)) => format!("{p}.{m}"),
        (None, Some(m)) => m.to_string(),
        (Some(p), None) => p.to_string(),
        (None, None) => "body".to_string(),
    };
    FieldError {
        field,
        message: message.to_string(),
    }
}
