use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::db::AppDatabases;
use crate::model::employee::{self, C3aisEmployee};
use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use std::path::Component;
use std::path::Path;
use tracing::error;

/// Directory profile of the logged-in employee (read-only c3ais lookup)
#[utoipa::path(
    get,
    path = "/api/employees/me",
    responses(
        (status = 200, description = "Employee profile", body = C3aisEmployee),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "Employee not found in directory"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn me(auth: AuthUser, db: web::Data<AppDatabases>) -> actix_web::Result<impl Responder> {
    let employee_id = auth
        .employee_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;

    let profile = employee::find_by_id(&db.c3ais, employee_id)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to fetch employee profile");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    match profile {
        Some(emp) => Ok(HttpResponse::Ok().json(emp)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": "Employee not found in directory"
        }))),
    }
}

/// Serve a reference photo from the c3ais photo share.
#[utoipa::path(
    get,
    path = "/api/employees/photo/{path}",
    params(
        ("path" = String, Path, description = "Photo path relative to the photo share")
    ),
    responses(
        (status = 200, description = "Photo bytes", content_type = "image/jpeg"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Photo not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn photo(
    _auth: AuthUser,
    path: web::Path<String>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let relative = path.into_inner();

    // No escaping the share root
    let clean = Path::new(&relative);
    if clean
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Ok(HttpResponse::NotFound().finish());
    }

    let full = config.c3ais_photo_root.join(clean);
    match tokio::fs::read(&full).await {
        Ok(bytes) => Ok(HttpResponse::Ok().content_type("image/jpeg").body(bytes)),
        Err(_) => Ok(HttpResponse::NotFound().finish()),
    }
}
