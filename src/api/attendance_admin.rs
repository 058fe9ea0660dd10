use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::db::AppDatabases;
use crate::model::attendance::AttendanceRecord;
use crate::service::image_store::{DiskImageStore, FaceImageStore};
use crate::utils::attendance_filter;
use crate::utils::db_utils::SqlValue;
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct RecordQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    /// Only records flagged by the fraud evaluator
    pub suspicious: Option<bool>,
    /// "check_in" or "check_out"
    pub check_type: Option<String>,
}

fn bind_values<'q>(
    mut query: sqlx::query::QueryAs<'q, sqlx::MySql, AttendanceRecord, sqlx::mysql::MySqlArguments>,
    bindings: &'q [SqlValue],
) -> sqlx::query::QueryAs<'q, sqlx::MySql, AttendanceRecord, sqlx::mysql::MySqlArguments> {
    for value in bindings {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Review listing of attendance records
#[utoipa::path(
    get,
    path = "/api/attendance-records",
    params(RecordQuery),
    responses(
        (status = 200, description = "Paginated records", body = Object, example = json!({
            "data": [], "page": 1, "per_page": 20, "total": 0
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Records"
)]
pub async fn list_records(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    query: web::Query<RecordQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();
    let mut bindings: Vec<SqlValue> = Vec::new();

    if let Some(employee_id) = query.employee_id {
        conditions.push("employee_id = ?");
        bindings.push(SqlValue::I64(employee_id as i64));
    }
    if let Some(start) = query.start_date {
        conditions.push("attendance_date >= ?");
        bindings.push(SqlValue::Date(start));
    }
    if let Some(end) = query.end_date {
        conditions.push("attendance_date <= ?");
        bindings.push(SqlValue::Date(end));
    }
    if let Some(suspicious) = query.suspicious {
        conditions.push("is_suspicious = ?");
        bindings.push(SqlValue::Bool(suspicious));
    }
    if let Some(check_type) = &query.check_type {
        conditions.push("check_type = ?");
        bindings.push(SqlValue::String(check_type.clone()));
    }

    let where_clause = if conditions.is_empty() {
        "".to_string()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM attendance_records {}", where_clause);
    debug!(sql = %count_sql, "Counting attendance records");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for value in &bindings {
        count_query = match value {
            SqlValue::String(v) => count_query.bind(v),
            SqlValue::I64(v) => count_query.bind(v),
            SqlValue::F64(v) => count_query.bind(v),
            SqlValue::Bool(v) => count_query.bind(v),
            SqlValue::Date(v) => count_query.bind(v),
            SqlValue::Null => count_query.bind(None::<String>),
        };
    }

    let total = count_query.fetch_one(&db.local).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count attendance records");
        ErrorInternalServerError("Database error")
    })?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT * FROM attendance_records {} ORDER BY attendance_date DESC, created_at DESC LIMIT ? OFFSET ?",
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, "Fetching attendance records");

    let data_query = bind_values(
        sqlx::query_as::<_, AttendanceRecord>(&data_sql),
        &bindings,
    )
    .bind(per_page as i64)
    .bind(offset as i64);

    let records = data_query.fetch_all(&db.local).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch attendance records");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(json!({
        "data": records,
        "page": page,
        "per_page": per_page,
        "total": total,
    })))
}

/// Fetch a single attendance record
#[utoipa::path(
    get,
    path = "/api/attendance-records/{id}",
    params(("id", Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record found", body = Object),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Record not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Records"
)]
pub async fn get_record(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let record_id = path.into_inner();

    let record = sqlx::query_as::<_, AttendanceRecord>(
        r#"SELECT * FROM attendance_records WHERE id = ?"#,
    )
    .bind(record_id)
    .fetch_optional(&db.local)
    .await
    .map_err(|e| {
        error!(error = %e, record_id, "Failed to fetch attendance record");
        ErrorInternalServerError("Internal Server Error")
    })?;

    match record {
        Some(rec) => Ok(HttpResponse::Ok().json(rec)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "message": "Record not found"
        }))),
    }
}

/// Delete an attendance record, cascading the stored face image
#[utoipa::path(
    delete,
    path = "/api/attendance-records/{id}",
    params(("id", Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record deleted", body = Object, example = json!({
            "message": "Record deleted successfully"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Record not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Records"
)]
pub async fn delete_record(
    auth: AuthUser,
    db: web::Data<AppDatabases>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let record_id = path.into_inner();

    let record = sqlx::query_as::<_, AttendanceRecord>(
        r#"SELECT * FROM attendance_records WHERE id = ?"#,
    )
    .bind(record_id)
    .fetch_optional(&db.local)
    .await
    .map_err(|e| {
        error!(error = %e, record_id, "Failed to fetch attendance record");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let Some(record) = record else {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": "Record not found"
        })));
    };

    sqlx::query(r#"DELETE FROM attendance_records WHERE id = ?"#)
        .bind(record_id)
        .execute(&db.local)
        .await
        .map_err(|e| {
            error!(error = %e, record_id, "Failed to delete attendance record");
            ErrorInternalServerError("Internal Server Error")
        })?;

    // Cascade cleanup: stored capture and the idempotency filter key.
    if let Some(image_path) = &record.face_image_path {
        DiskImageStore::new(config.storage_root.clone())
            .delete(image_path)
            .await;
    }
    attendance_filter::remove(record.employee_id, record.attendance_date, record.check_type);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Record deleted successfully"
    })))
}
