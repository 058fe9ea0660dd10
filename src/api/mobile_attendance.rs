use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::db::AppDatabases;
use crate::model::attendance::{self, AttendanceRecord, CheckType, SqlLedger};
use crate::model::employee;
use crate::model::fraud::LocationTelemetry;
use crate::service::face::ScriptFaceVerifier;
use crate::service::image_store::{DiskImageStore, decode_base64_image};
use crate::service::submission::{self, EmployeeContext, SubmissionError, SubmissionRequest};
use crate::utils::location_cache;
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::time::Duration;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, ToSchema)]
pub struct LocationDto {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Head Office")]
    pub name: String,
    #[schema(example = "Jl. Jend. Sudirman Kav. 52-53, Jakarta", nullable = true)]
    pub address: Option<String>,
    #[schema(example = -6.2)]
    pub latitude: f64,
    #[schema(example = 106.8)]
    pub longitude: f64,
    #[schema(example = 100)]
    pub radius_meters: u32,
}

/// List active attendance locations
#[utoipa::path(
    get,
    path = "/api/mobile-attendance/locations",
    responses(
        (status = 200, description = "Active attendance locations", body = Object, example = json!({
            "success": true,
            "message": "Attendance locations retrieved successfully",
            "data": [{
                "id": 1, "name": "Head Office", "address": null,
                "latitude": -6.2, "longitude": 106.8, "radius_meters": 100
            }]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Mobile Attendance"
)]
pub async fn get_locations(db: web::Data<AppDatabases>) -> actix_web::Result<impl Responder> {
    let registry = location_cache::registry(&db.local).await.map_err(|e| {
        error!(error = %e, "Failed to load attendance locations");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let data: Vec<LocationDto> = registry
        .locations()
        .iter()
        .map(|loc| LocationDto {
            id: loc.id,
            name: loc.name.clone(),
            address: loc.address.clone(),
            latitude: loc.latitude,
            longitude: loc.longitude,
            radius_meters: loc.radius_meters,
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Attendance locations retrieved successfully",
        "data": data,
    })))
}

/// id -> name for every configured location, active or not. History rows can
/// reference locations that were deactivated since.
async fn location_names(pool: &MySqlPool) -> Result<HashMap<u64, String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (u64, String)>("SELECT id, name FROM attendance_locations")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

#[derive(Serialize, ToSchema)]
pub struct CheckEventDto {
    #[schema(example = "2026-03-02T08:15:42Z", format = "date-time", value_type = String)]
    pub time: DateTime<Utc>,
    #[schema(example = "Head Office")]
    pub location: String,
    pub location_verified: bool,
    pub face_verified: bool,
}

fn event_dto(record: &AttendanceRecord, names: &HashMap<u64, String>) -> CheckEventDto {
    CheckEventDto {
        time: record.created_at,
        location: names
            .get(&record.location_id)
            .cloned()
            .unwrap_or_else(|| "-".to_string()),
        location_verified: record.location_verified,
        face_verified: record.face_verified,
    }
}

/// Today's attendance status for the logged-in employee
#[utoipa::path(
    get,
    path = "/api/mobile-attendance/today-status",
    responses(
        (status = 200, description = "Today's status", body = Object, example = json!({
            "success": true,
            "message": "Today status retrieved successfully",
            "data": {
                "date": "2026-03-02",
                "can_check_in": false,
                "can_check_out": true,
                "check_in": {
                    "time": "2026-03-02T08:15:42Z", "location": "Head Office",
                    "location_verified": true, "face_verified": true
                },
                "check_out": null
            }
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Mobile Attendance"
)]
pub async fn today_status(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth
        .employee_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;

    let today = Local::now().date_naive();

    let (check_in, check_out) = attendance::today_status(&db.local, employee_id, today)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to fetch today status");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    let names = location_names(&db.local).await.map_err(|e| {
        error!(error = %e, "Failed to fetch location names");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Today status retrieved successfully",
        "data": {
            "date": today,
            "can_check_in": check_in.is_none(),
            "can_check_out": check_in.is_some() && check_out.is_none(),
            "check_in": check_in.as_ref().map(|r| event_dto(r, &names)),
            "check_out": check_out.as_ref().map(|r| event_dto(r, &names)),
        },
    })))
}

#[derive(Deserialize, ToSchema)]
pub struct ValidateLocationRequest {
    #[schema(example = -6.2)]
    pub latitude: f64,
    #[schema(example = 106.8)]
    pub longitude: f64,
}

fn coordinates_in_range(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

/// Validate coordinates before attempting attendance. Diagnostic only.
#[utoipa::path(
    post,
    path = "/api/mobile-attendance/validate-location",
    request_body = ValidateLocationRequest,
    responses(
        (status = 200, description = "Validation result", body = Object, example = json!({
            "success": true,
            "message": "Location is valid",
            "data": {
                "is_valid": true, "location_id": 1, "location_name": "Head Office",
                "distance_meters": 42.17, "radius_meters": 100
            }
        })),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Coordinates out of range"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Mobile Attendance"
)]
pub async fn validate_location(
    db: web::Data<AppDatabases>,
    payload: web::Json<ValidateLocationRequest>,
) -> actix_web::Result<impl Responder> {
    if !coordinates_in_range(payload.latitude, payload.longitude) {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({
            "success": false,
            "message": "Validation failed",
            "errors": { "coordinates": "latitude must be in -90..90 and longitude in -180..180" },
        })));
    }

    let registry = location_cache::registry(&db.local).await.map_err(|e| {
        error!(error = %e, "Failed to load attendance locations");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    if let Some(location) = registry.find_containing(payload.latitude, payload.longitude) {
        let distance = location.distance_from(payload.latitude, payload.longitude);
        return Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Location is valid",
            "data": {
                "is_valid": true,
                "location_id": location.id,
                "location_name": location.name,
                "distance_meters": (distance * 100.0).round() / 100.0,
                "radius_meters": location.radius_meters,
            },
        })));
    }

    let nearest = registry.find_nearest(payload.latitude, payload.longitude);
    Ok(HttpResponse::Ok().json(json!({
        "success": false,
        "message": "Location is outside allowed radius",
        "data": {
            "is_valid": false,
            "nearest_location": nearest.map(|n| n.name.clone()),
            "distance_to_nearest": nearest.map(|n| {
                let d = n.distance_from(payload.latitude, payload.longitude);
                (d * 100.0).round() / 100.0
            }),
            "required_radius": nearest.map(|n| n.radius_meters),
        },
    })))
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitAttendanceRequest {
    #[schema(example = "check_in")]
    pub check_type: CheckType,
    #[schema(example = -6.2)]
    pub latitude: f64,
    #[schema(example = 106.8)]
    pub longitude: f64,
    /// Base64-encoded captured face image (optionally a data URL)
    pub face_image: String,
    /// Client-side confidence claim; advisory only, the server recomputes it
    pub face_confidence: Option<f64>,
    #[schema(example = "Pixel 8", nullable = true)]
    pub device_info: Option<String>,
    pub liveness_verified: bool,
    pub is_mock_location: Option<bool>,
    pub is_rooted: Option<bool>,
    pub wifi_ssid: Option<String>,
    pub wifi_bssid: Option<String>,
    pub gps_accuracy: Option<f64>,
    pub location_age_ms: Option<u64>,
    pub location_provider: Option<String>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
}

impl SubmitAttendanceRequest {
    /// Field-level validation, before any business logic runs.
    fn validate(&self) -> HashMap<&'static str, String> {
        let mut errors = HashMap::new();

        if !(-90.0..=90.0).contains(&self.latitude) {
            errors.insert("latitude", "must be between -90 and 90".to_string());
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            errors.insert("longitude", "must be between -180 and 180".to_string());
        }
        if self.face_image.trim().is_empty() {
            errors.insert("face_image", "is required".to_string());
        }
        if let Some(info) = &self.device_info {
            if info.len() > 255 {
                errors.insert("device_info", "must be at most 255 characters".to_string());
            }
        }
        if let Some(ssid) = &self.wifi_ssid {
            if ssid.len() > 100 {
                errors.insert("wifi_ssid", "must be at most 100 characters".to_string());
            }
        }
        if let Some(bssid) = &self.wifi_bssid {
            if bssid.len() > 50 {
                errors.insert("wifi_bssid", "must be at most 50 characters".to_string());
            }
        }
        if let Some(provider) = &self.location_provider {
            if provider.len() > 50 {
                errors.insert("location_provider", "must be at most 50 characters".to_string());
            }
        }
        if matches!(self.gps_accuracy, Some(acc) if acc < 0.0) {
            errors.insert("gps_accuracy", "must be non-negative".to_string());
        }
        if matches!(self.speed, Some(speed) if speed < 0.0) {
            errors.insert("speed", "must be non-negative".to_string());
        }

        errors
    }
}

/// Submit a check-in or check-out
#[utoipa::path(
    post,
    path = "/api/mobile-attendance/submit",
    request_body = SubmitAttendanceRequest,
    responses(
        (status = 201, description = "Attendance accepted", body = Object, example = json!({
            "success": true,
            "message": "Check-In recorded successfully",
            "data": {
                "id": 512, "check_type": "check_in", "time": "2026-03-02T08:15:42Z",
                "location": "Head Office", "location_verified": true, "face_verified": true,
                "face_confidence": 92.4, "is_suspicious": false, "suspicious_flags": []
            }
        })),
        (status = 400, description = "Business rejection", body = Object, example = json!({
            "success": false,
            "message": "You have already checked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Mobile Attendance"
)]
pub async fn submit(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    config: web::Data<Config>,
    payload: web::Json<SubmitAttendanceRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth
        .employee_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;

    let errors = payload.validate();
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({
            "success": false,
            "message": "Validation failed",
            "errors": errors,
        })));
    }

    let face_image = match decode_base64_image(&payload.face_image) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Ok(HttpResponse::UnprocessableEntity().json(json!({
                "success": false,
                "message": "Validation failed",
                "errors": { "face_image": "must be valid base64 image data" },
            })));
        }
    };

    let registry = location_cache::registry(&db.local).await.map_err(|e| {
        error!(error = %e, "Failed to load attendance locations");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let reference_photo = employee::reference_photo(&db.c3ais, employee_id)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to resolve reference photo");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?
        .map(|name| config.c3ais_photo_root.join(name));

    let context = EmployeeContext {
        employee_id,
        user_id: Some(auth.user_id),
        reference_photo,
    };

    let request = SubmissionRequest {
        check_type: payload.check_type,
        latitude: payload.latitude,
        longitude: payload.longitude,
        face_image,
        liveness_verified: payload.liveness_verified,
        device_info: payload.device_info.clone(),
        telemetry: LocationTelemetry {
            is_mock_location: payload.is_mock_location.unwrap_or(false),
            is_rooted: payload.is_rooted.unwrap_or(false),
            gps_accuracy: payload.gps_accuracy,
            location_age_ms: payload.location_age_ms,
            speed: payload.speed,
        },
        wifi_ssid: payload.wifi_ssid.clone(),
        wifi_bssid: payload.wifi_bssid.clone(),
        location_provider: payload.location_provider.clone(),
        altitude: payload.altitude,
    };

    let ledger = SqlLedger::new(&db.local);
    let verifier = ScriptFaceVerifier::new(
        config.face_script_path.clone(),
        Duration::from_secs(config.face_compare_timeout_secs),
    );
    let images = DiskImageStore::new(config.storage_root.clone());

    match submission::submit(&ledger, &registry, &verifier, &images, &context, request).await {
        Ok(outcome) => Ok(HttpResponse::Created().json(json!({
            "success": true,
            "message": outcome.message,
            "data": {
                "id": outcome.id,
                "check_type": outcome.check_type,
                "time": outcome.created_at,
                "location": outcome.location_name,
                "location_verified": true,
                "face_verified": true,
                "face_confidence": outcome.face_confidence,
                "is_suspicious": outcome.is_suspicious,
                "suspicious_flags": outcome.suspicious_flags,
            },
        }))),
        Err(SubmissionError::Rejected(rejection)) => {
            Ok(HttpResponse::BadRequest().json(json!({
                "success": false,
                "message": rejection.user_message(),
            })))
        }
        Err(SubmissionError::Internal(e)) => {
            error!(error = %e, employee_id, "Attendance submission failed");
            Ok(HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Failed to record attendance",
            })))
        }
    }
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct HistoryQuery {
    /// Range start (YYYY-MM-DD); used together with end_date
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    /// Range end (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    /// Month 1-12; used together with year
    pub month: Option<u32>,
    /// Year, 2020 or later
    pub year: Option<i32>,
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next.pred_opt()?))
}

fn resolve_range(query: &HistoryQuery, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), String> {
    match (query.start_date, query.end_date, query.month, query.year) {
        (Some(start), Some(end), _, _) => {
            if end < start {
                return Err("end_date must not be before start_date".to_string());
            }
            Ok((start, end))
        }
        (None, None, Some(month), Some(year)) => {
            if !(1..=12).contains(&month) {
                return Err("month must be between 1 and 12".to_string());
            }
            if year < 2020 {
                return Err("year must be 2020 or later".to_string());
            }
            month_bounds(year, month).ok_or_else(|| "invalid month/year".to_string())
        }
        (None, None, None, None) => {
            // Default: the current month
            month_bounds(today.year(), today.month()).ok_or_else(|| "invalid date".to_string())
        }
        _ => Err("provide either start_date and end_date, or month and year".to_string()),
    }
}

#[derive(Serialize, ToSchema)]
pub struct DayHistory {
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub check_in: Option<CheckEventDto>,
    pub check_out: Option<CheckEventDto>,
}

/// Fold the range query rows (date DESC, created_at ASC) into per-day pairs,
/// preserving the date ordering.
fn group_history(records: &[AttendanceRecord], names: &HashMap<u64, String>) -> Vec<DayHistory> {
    let mut days: Vec<DayHistory> = Vec::new();

    for record in records {
        if days.last().map(|d| d.date) != Some(record.attendance_date) {
            days.push(DayHistory {
                date: record.attendance_date,
                check_in: None,
                check_out: None,
            });
        }

        let day = days.last_mut().unwrap();
        let entry = event_dto(record, names);
        match record.check_type {
            CheckType::CheckIn => day.check_in = Some(entry),
            CheckType::CheckOut => day.check_out = Some(entry),
        }
    }

    days
}

/// Attendance history for the logged-in employee, grouped by date
#[utoipa::path(
    get,
    path = "/api/mobile-attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Date-grouped history", body = Object, example = json!({
            "success": true,
            "message": "Attendance history retrieved successfully",
            "data": {
                "start_date": "2026-03-01",
                "end_date": "2026-03-31",
                "total_days": 1,
                "records": [{
                    "date": "2026-03-02",
                    "check_in": {
                        "time": "2026-03-02T08:15:42Z", "location": "Head Office",
                        "location_verified": true, "face_verified": true
                    },
                    "check_out": null
                }]
            }
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Mobile Attendance"
)]
pub async fn history(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    query: web::Query<HistoryQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth
        .employee_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;

    let today = Local::now().date_naive();
    let (start, end) = match resolve_range(&query, today) {
        Ok(range) => range,
        Err(message) => {
            return Ok(HttpResponse::UnprocessableEntity().json(json!({
                "success": false,
                "message": "Validation failed",
                "errors": { "range": message },
            })));
        }
    };

    let records = attendance::by_date_range(&db.local, employee_id, start, end)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to fetch attendance history");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    let names = location_names(&db.local).await.map_err(|e| {
        error!(error = %e, "Failed to fetch location names");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let grouped = group_history(&records, &names);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Attendance history retrieved successfully",
        "data": {
            "start_date": start,
            "end_date": end,
            "total_days": grouped.len(),
            "records": grouped,
        },
    })))
}

/// Reference photo descriptor for the logged-in employee
#[utoipa::path(
    get,
    path = "/api/mobile-attendance/avatar",
    responses(
        (status = 200, description = "Avatar descriptor", body = Object, example = json!({
            "success": true,
            "message": "Employee avatar retrieved successfully",
            "data": {
                "avatar_url": "/api/employees/photo/photos/10023.jpg",
                "avatar_path": "photos/10023.jpg"
            }
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "No avatar enrolled"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Mobile Attendance"
)]
pub async fn avatar(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth
        .employee_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;

    let photo = employee::reference_photo(&db.c3ais, employee_id)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to fetch employee avatar");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    match photo {
        Some(path) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Employee avatar retrieved successfully",
            "data": {
                "avatar_url": format!("{}/employees/photo/{}", config.api_prefix, path),
                "avatar_path": path,
            },
        }))),
        None => Ok(HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Employee avatar not found",
        }))),
    }
}
