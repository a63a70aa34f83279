use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, FieldError},
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, AppointmentType, Branch, Holiday, HolidayType},
    permissions::{Capability, Resource, ensure_capability},
    scheduling::{HolidayFilter, SchedulingError, calendar_rules::DateRejection},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/public/branches", get(list_branches))
        .route("/public/branches/{branch_id}/availability", get(check_availability))
        .route("/public/appointment-types", get(list_appointment_types))
        .route("/branches", get(list_all_branches))
        .route("/holidays", get(list_holidays).post(create_holiday))
        .route("/holidays/{holiday_id}/deactivate", post(deactivate_holiday))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityData {
    pub branch_id: Uuid,
    pub date: NaiveDate,
    pub bookable: bool,
    pub reason: Option<String>,
    pub rule: Option<DateRejection>,
}

#[derive(Debug, Deserialize)]
pub struct HolidayListQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHolidayRequest {
    pub holiday_date: NaiveDate,
    pub name: String,
    pub holiday_type: HolidayType,
    pub branch_id: Option<Uuid>,
}

/* ============================================================
   Public catalogue
   ============================================================ */

pub async fn list_branches(State(state): State<AppState>) -> Result<Json<ApiOk<Vec<Branch>>>, ApiError> {
    let branches = state
        .stores
        .branches
        .list_active()
        .await
        .map_err(SchedulingError::operation("listing branches"))?;
    Ok(Json(ApiOk { data: branches }))
}

pub async fn list_appointment_types(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<AppointmentType>>>, ApiError> {
    let types = state
        .stores
        .appointment_types
        .list_active()
        .await
        .map_err(SchedulingError::operation("listing appointment types"))?;
    Ok(Json(ApiOk { data: types }))
}

pub async fn check_availability(
    State(state): State<AppState>,
    Path(branch_id): Path<Uuid>,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<ApiOk<AvailabilityData>>, ApiError> {
    state
        .stores
        .branches
        .find_by_id(branch_id)
        .await
        .map_err(SchedulingError::operation("checking availability"))?
        .filter(|b| b.is_active)
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "Branch not found".into()))?;

    let rejection = state
        .scheduling
        .calendar()
        .evaluate(branch_id, q.date, Utc::now().date_naive())
        .await?;

    Ok(Json(ApiOk {
        data: AvailabilityData {
            branch_id,
            date: q.date,
            bookable: rejection.is_none(),
            reason: rejection.as_ref().map(ToString::to_string),
            rule: rejection,
        },
    }))
}

/* ============================================================
   Staff
   ============================================================ */

pub async fn list_all_branches(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Branch>>>, ApiError> {
    ensure_capability(&auth, Resource::Branches, Capability::Read)?;
    let branches = state
        .stores
        .branches
        .list_all()
        .await
        .map_err(SchedulingError::operation("listing branches"))?;
    Ok(Json(ApiOk { data: branches }))
}

pub async fn list_holidays(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<HolidayListQuery>,
) -> Result<Json<ApiOk<Vec<Holiday>>>, ApiError> {
    ensure_capability(&auth, Resource::Holidays, Capability::Read)?;

    let filter = HolidayFilter {
        from: q.from,
        to: q.to,
        branch_id: q.branch_id,
    };
    let holidays = state
        .stores
        .holidays
        .list(&filter)
        .await
        .map_err(SchedulingError::operation("listing holidays"))?;
    Ok(Json(ApiOk { data: holidays }))
}

fn validate_holiday(req: &CreateHolidayRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.name.trim().is_empty() {
        errors.push(FieldError::new("name", "name is required"));
    }
    if req.holiday_type == HolidayType::Branch && req.branch_id.is_none() {
        errors.push(FieldError::new("branch_id", "branch_id is required for a branch holiday"));
    }
    errors
}

pub async fn create_holiday(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(req), _): WithRejection<Json<CreateHolidayRequest>, ApiError>,
) -> Result<(StatusCode, Json<ApiOk<Holiday>>), ApiError> {
    ensure_capability(&auth, Resource::Holidays, Capability::Create)?;

    let errors = validate_holiday(&req);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let holiday = Holiday {
        holiday_id: Uuid::new_v4(),
        holiday_date: req.holiday_date,
        name: req.name.trim().to_string(),
        holiday_type: req.holiday_type,
        // national holidays never carry a branch
        branch_id: match req.holiday_type {
            HolidayType::National => None,
            HolidayType::Branch => req.branch_id,
        },
        is_active: true,
    };
    let holiday = state
        .stores
        .holidays
        .insert(&holiday)
        .await
        .map_err(SchedulingError::operation("creating holiday"))?;

    tracing::info!(holiday_id = %holiday.holiday_id, date = %holiday.holiday_date, "holiday created");
    Ok((StatusCode::CREATED, Json(ApiOk { data: holiday })))
}

pub async fn deactivate_holiday(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(holiday_id): Path<Uuid>,
) -> Result<Json<ApiOk<Holiday>>, ApiError> {
    ensure_capability(&auth, Resource::Holidays, Capability::Delete)?;

    let holiday = state
        .stores
        .holidays
        .deactivate(holiday_id)
        .await
        .map_err(SchedulingError::operation("deactivating holiday"))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "Holiday not found".into()))?;
    Ok(Json(ApiOk { data: holiday }))
}
