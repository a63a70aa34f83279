use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Appointment, AppointmentStatus},
    permissions::{Capability, Resource, ensure_capability},
    scheduling::{
        SchedulingError,
        booking::{SimpleBookingRequest, SimpleBookingResult},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        // public booking surface
        .route("/public/appointments/simple", post(schedule_simple))
        .route("/public/appointments/{appointment_number}/cancel", post(cancel_public))
        .route(
            "/public/clients/{document_number}/appointments",
            get(list_client_appointments),
        )
        // staff
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route(
            "/appointments/{appointment_id}/cancel",
            post(cancel_appointment).put(cancel_appointment),
        )
        .route("/appointments/{appointment_id}/confirm", post(confirm_appointment))
        .route("/appointments/{appointment_id}/start", post(start_appointment))
        .route("/appointments/{appointment_id}/complete", post(complete_appointment))
        .route("/appointments/{appointment_id}/remind", post(remind_appointment))
}

/* ============================================================
   Request DTOs
   ============================================================ */

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublicCancelRequest {
    pub document_number: String,
    pub reason: Option<String>,
}

/* ============================================================
   Public
   ============================================================ */

pub async fn schedule_simple(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<SimpleBookingRequest>, ApiError>,
) -> Result<(StatusCode, Json<ApiOk<SimpleBookingResult>>), ApiError> {
    let booked = state.scheduling.schedule_simple(req, Utc::now()).await?;
    // notifications keep running after the response
    Ok((StatusCode::CREATED, Json(ApiOk { data: booked.value })))
}

pub async fn cancel_public(
    State(state): State<AppState>,
    Path(appointment_number): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<PublicCancelRequest>, ApiError>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let cancelled = state
        .scheduling
        .cancel_by_number(&appointment_number, &req.document_number, req.reason, Utc::now())
        .await?;
    Ok(Json(ApiOk { data: cancelled.value }))
}

pub async fn list_client_appointments(
    State(state): State<AppState>,
    Path(document_number): Path<String>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let list = state.scheduling.appointments_for_document(&document_number).await?;
    Ok(Json(ApiOk { data: list }))
}

/* ============================================================
   Staff
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    ensure_capability(&auth, Resource::Appointments, Capability::Read)?;

    let appointment = state
        .stores
        .appointments
        .find_by_id(appointment_id)
        .await
        .map_err(SchedulingError::operation("loading appointment"))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "Appointment not found".into()))?;
    Ok(Json(ApiOk { data: appointment }))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    ensure_capability(&auth, Resource::Appointments, Capability::Update)?;

    let Json(req) = body.unwrap_or_default();
    let cancelled = state
        .scheduling
        .cancel(appointment_id, req.reason, Utc::now())
        .await?;
    Ok(Json(ApiOk { data: cancelled.value }))
}

async fn advance(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: Uuid,
    next: AppointmentStatus,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    ensure_capability(auth, Resource::Appointments, Capability::Update)?;
    let updated = state.scheduling.advance(appointment_id, next, Utc::now()).await?;
    Ok(Json(ApiOk { data: updated }))
}

pub async fn confirm_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    advance(&state, &auth, appointment_id, AppointmentStatus::Confirmed).await
}

pub async fn start_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    advance(&state, &auth, appointment_id, AppointmentStatus::InProgress).await
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    advance(&state, &auth, appointment_id, AppointmentStatus::Completed).await
}

pub async fn remind_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    ensure_capability(&auth, Resource::Appointments, Capability::Update)?;
    let reminded = state.scheduling.remind(appointment_id).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiOk { data: reminded.value })))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, header};
    use chrono::{Datelike, Duration, NaiveDate, Weekday};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::models::Role;
    use crate::routes::test_support::{TestApp, test_app};

    fn upcoming(weekday: Weekday) -> NaiveDate {
        let mut d = Utc::now().date_naive() + Duration::days(1);
        while d.weekday() != weekday {
            d += Duration::days(1);
        }
        d
    }

    fn booking(app: &TestApp, date: NaiveDate) -> Value {
        json!({
            "document_type": "CC",
            "document_number": "123",
            "full_name": "Jorge Ivan Perdomo",
            "mobile": "3209876543",
            "email": "jorge@example.com",
            "branch_id": app.branch_id,
            "appointment_type_id": app.type_id,
            "appointment_date": date.format("%Y-%m-%d").to_string(),
            "appointment_time": "10:00"
        })
    }

    async fn post_json(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
        let res = app
            .router()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn public_booking_returns_created_with_numbers() {
        let app = test_app();
        let (status, body) = post_json(
            &app,
            "/api/v1/public/appointments/simple",
            booking(&app, upcoming(Weekday::Mon)),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let data = &body["data"];
        assert!(data["client_number"].as_str().unwrap().starts_with("CLI-"));
        assert!(data["appointment_number"].as_str().unwrap().starts_with("APT-"));
        assert_eq!(data["status"], "pending");
        assert_eq!(data["appointment_time"], "10:00");
        assert_eq!(data["branch_name"], "Sede Neiva Centro");
        assert_eq!(app.store.appointment_count(), 1);
    }

    #[tokio::test]
    async fn sunday_booking_is_a_business_rule_error() {
        let app = test_app();
        let (status, body) = post_json(
            &app,
            "/api/v1/public/appointments/simple",
            booking(&app, upcoming(Weekday::Sun)),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "DATE_NOT_BOOKABLE");
        assert_eq!(body["error"]["message"], "Appointments cannot be scheduled on Sundays");
        assert_eq!(app.store.appointment_count(), 0);
    }

    #[tokio::test]
    async fn invalid_fields_come_back_as_a_list() {
        let app = test_app();
        let mut req = booking(&app, upcoming(Weekday::Mon));
        req["appointment_time"] = json!("25:00");
        req["email"] = json!("nope");
        let (status, body) = post_json(&app, "/api/v1/public/appointments/simple", req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        let fields: Vec<&str> = body["error"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["email", "appointment_time"]);
    }

    #[tokio::test]
    async fn unknown_branch_is_service_unavailable() {
        let app = test_app();
        let mut req = booking(&app, upcoming(Weekday::Mon));
        req["branch_id"] = json!(Uuid::new_v4());
        let (status, body) = post_json(&app, "/api/v1/public/appointments/simple", req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "BRANCH_UNAVAILABLE");
    }

    #[tokio::test]
    async fn public_cancel_checks_document_and_is_not_repeatable() {
        let app = test_app();
        let (_, body) = post_json(
            &app,
            "/api/v1/public/appointments/simple",
            booking(&app, upcoming(Weekday::Tue)),
        )
        .await;
        let number = body["data"]["appointment_number"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/public/appointments/{number}/cancel");

        let (status, _) = post_json(&app, &uri, json!({ "document_number": "000" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = post_json(&app, &uri, json!({ "document_number": "123", "reason": "Viaje" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "cancelled");
        assert_eq!(body["data"]["cancellation_reason"], "Viaje");

        let (status, body) = post_json(&app, &uri, json!({ "document_number": "123" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Appointment is already cancelled");
    }

    fn first_field(body: &Value) -> &str {
        body["error"]["fields"][0]["field"].as_str().unwrap()
    }

    #[tokio::test]
    async fn unreadable_booking_bodies_come_back_as_field_errors() {
        let app = test_app();

        let mut missing = booking(&app, upcoming(Weekday::Mon));
        missing.as_object_mut().unwrap().remove("full_name");
        let (status, body) = post_json(&app, "/api/v1/public/appointments/simple", missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(first_field(&body), "full_name");

        let mut bad_uuid = booking(&app, upcoming(Weekday::Mon));
        bad_uuid["branch_id"] = json!("not-a-uuid");
        let (status, body) = post_json(&app, "/api/v1/public/appointments/simple", bad_uuid).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(first_field(&body), "branch_id");

        let mut bad_kind = booking(&app, upcoming(Weekday::Mon));
        bad_kind["document_type"] = json!("PASSPORT");
        let (status, body) = post_json(&app, "/api/v1/public/appointments/simple", bad_kind).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(first_field(&body), "document_type");

        assert_eq!(app.store.client_count(), 0);
        assert_eq!(app.store.appointment_count(), 0);
    }

    #[tokio::test]
    async fn public_cancel_without_document_is_a_field_error() {
        let app = test_app();
        let (status, body) = post_json(
            &app,
            "/api/v1/public/appointments/APT-20300101-0000AAAA/cancel",
            json!({ "reason": "Viaje" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(first_field(&body), "document_number");
    }

    #[tokio::test]
    async fn staff_walk_an_appointment_to_completion() {
        let app = test_app();
        let (_, body) = post_json(
            &app,
            "/api/v1/public/appointments/simple",
            booking(&app, upcoming(Weekday::Wed)),
        )
        .await;
        let appointment_id = body["data"]["appointment_id"].as_str().unwrap().to_string();
        let (_, token) = app.sign_in(Role::Agent);

        for (step, status_name) in [("confirm", "confirmed"), ("start", "in_progress"), ("complete", "completed")] {
            let uri = format!("/api/v1/appointments/{appointment_id}/{step}");
            let (status, body) = app.call(Method::POST, &uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::OK, "{step}");
            assert_eq!(body["data"]["status"], status_name);
        }

        let uri = format!("/api/v1/appointments/{appointment_id}/cancel");
        let (status, body) = app.call(Method::PUT, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Cannot cancel a completed appointment");

        let uri = format!("/api/v1/appointments/{appointment_id}/remind");
        let (status, _) = app.call(Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn staff_cancel_records_the_reason() {
        let app = test_app();
        let (_, body) = post_json(
            &app,
            "/api/v1/public/appointments/simple",
            booking(&app, upcoming(Weekday::Thu)),
        )
        .await;
        let appointment_id = body["data"]["appointment_id"].as_str().unwrap().to_string();
        let (_, token) = app.sign_in(Role::Manager);

        let uri = format!("/api/v1/appointments/{appointment_id}/cancel");
        let (status, body) = app
            .call(Method::POST, &uri, Some(&token), Some(json!({ "reason": "Cliente no disponible" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "cancelled");
        assert_eq!(body["data"]["cancellation_reason"], "Cliente no disponible");

        let (status, body) = app
            .call(Method::GET, &format!("/api/v1/appointments/{appointment_id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn staff_routes_require_a_session() {
        let app = test_app();
        let (status, body) = post_json(
            &app,
            &format!("/api/v1/appointments/{}/confirm", Uuid::new_v4()),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
    }
}
