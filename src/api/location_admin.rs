use crate::auth::auth::AuthUser;
use crate::db::AppDatabases;
use crate::model::location::AttendanceLocation;
use crate::utils::db_utils::{build_update_sql, execute_update};
use crate::utils::location_cache;
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::error;
use utoipa::ToSchema;

/// Columns an admin may touch through the generic update payload.
const UPDATABLE_COLUMNS: &[&str] = &[
    "name",
    "address",
    "latitude",
    "longitude",
    "radius_meters",
    "is_active",
];

#[derive(Deserialize, ToSchema)]
pub struct CreateLocation {
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

fn validate_geometry(
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius_meters: Option<i64>,
) -> HashMap<&'static str, String> {
    let mut errors = HashMap::new();

    if matches!(latitude, Some(lat) if !(-90.0..=90.0).contains(&lat)) {
        errors.insert("latitude", "must be between -90 and 90".to_string());
    }
    if matches!(longitude, Some(lon) if !(-180.0..=180.0).contains(&lon)) {
        errors.insert("longitude", "must be between -180 and 180".to_string());
    }
    if matches!(radius_meters, Some(r) if !(10..=5000).contains(&r)) {
        errors.insert("radius_meters", "must be between 10 and 5000".to_string());
    }

    errors
}

/// Create an attendance location
#[utoipa::path(
    post,
    path = "/api/locations",
    request_body = CreateLocation,
    responses(
        (status = 201, description = "Location created", body = Object, example = json!({
            "message": "Location created successfully", "id": 3
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn create_location(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    payload: web::Json<CreateLocation>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    if payload.name.trim().is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({
            "message": "Validation failed",
            "errors": { "name": "is required" },
        })));
    }

    let errors = validate_geometry(
        Some(payload.latitude),
        Some(payload.longitude),
        Some(payload.radius_meters as i64),
    );
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({
            "message": "Validation failed",
            "errors": errors,
        })));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO attendance_locations (name, address, latitude, longitude, radius_meters, is_active)
        VALUES (?, ?, ?, ?, ?, TRUE)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.address)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(payload.radius_meters)
    .execute(&db.local)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create attendance location");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    location_cache::invalidate().await;

    Ok(HttpResponse::Created().json(json!({
        "message": "Location created successfully",
        "id": result.last_insert_id(),
    })))
}

/// List all attendance locations, active and inactive
#[utoipa::path(
    get,
    path = "/api/locations",
    responses(
        (status = 200, description = "All locations", body = [AttendanceLocation]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn list_locations(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let locations = sqlx::query_as::<_, AttendanceLocation>(
        r#"
        SELECT id, name, address, latitude, longitude, radius_meters, is_active
        FROM attendance_locations
        ORDER BY id
        "#,
    )
    .fetch_all(&db.local)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to list attendance locations");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(locations))
}

/// Update an attendance location (partial)
#[utoipa::path(
    put,
    path = "/api/locations/{id}",
    params(("id", Path, description = "Location ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Location updated", body = Object, example = json!({
            "message": "Location updated successfully"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Location not found"),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn update_location(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let location_id = path.into_inner();

    let errors = validate_geometry(
        body.get("latitude").and_then(Value::as_f64),
        body.get("longitude").and_then(Value::as_f64),
        body.get("radius_meters").and_then(Value::as_i64),
    );
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({
            "message": "Validation failed",
            "errors": errors,
        })));
    }

    let update = build_update_sql(
        "attendance_locations",
        &body,
        UPDATABLE_COLUMNS,
        "id",
        location_id,
    )?;

    let affected = execute_update(&db.local, update)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if affected == 0 {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": "Location not found"
        })));
    }

    location_cache::invalidate().await;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Location updated successfully"
    })))
}

/// Delete an attendance location
///
/// Blocked while attendance records still reference it; deactivate instead.
#[utoipa::path(
    delete,
    path = "/api/locations/{id}",
    params(("id", Path, description = "Location ID")),
    responses(
        (status = 200, description = "Location deleted", body = Object, example = json!({
            "message": "Location deleted successfully"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Location not found"),
        (status = 409, description = "Location still referenced", body = Object, example = json!({
            "message": "Location has attendance records; deactivate it instead"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Locations"
)]
pub async fn delete_location(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let location_id = path.into_inner();

    let result = sqlx::query(r#"DELETE FROM attendance_locations WHERE id = ?"#)
        .bind(location_id)
        .execute(&db.local)
        .await;

    match result {
        Ok(res) => {
            if res.rows_affected() == 0 {
                return Ok(HttpResponse::NotFound().json(json!({
                    "message": "Location not found"
                })));
            }

            location_cache::invalidate().await;

            Ok(HttpResponse::Ok().json(json!({
                "message": "Location deleted successfully"
            })))
        }
        Err(e) => {
            // FK restriction from attendance_records.location_id
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23000") {
                    return Ok(HttpResponse::Conflict().json(json!({
                        "message": "Location has attendance records; deactivate it instead"
                    })));
                }
            }

            error!(error = %e, location_id, "Failed to delete attendance location");
            Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Internal Server Error"
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_validation_accepts_boundary_values() {
        assert!(validate_geometry(Some(-90.0), Some(180.0), Some(10)).is_empty());
        assert!(validate_geometry(Some(90.0), Some(-180.0), Some(5000)).is_empty());
    }

    #[test]
    fn geometry_validation_rejects_out_of_range() {
        let errors = validate_geometry(Some(-90.1), Some(180.1), Some(9));
        assert!(errors.contains_key("latitude"));
        assert!(errors.contains_key("longitude"));
        assert!(errors.contains_key("radius_meters"));

        assert!(validate_geometry(None, None, Some(5001)).contains_key("radius_meters"));
    }

    #[test]
    fn absent_fields_are_not_validated() {
        assert!(validate_geometry(None, None, None).is_empty());
    }
}
