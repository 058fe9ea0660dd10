use crate::model::fraud::SuspicionFlag;
use crate::utils::attendance_filter;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use sqlx::types::Json;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
    sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CheckType {
    CheckIn,
    CheckOut,
}

impl CheckType {
    pub fn display_name(&self) -> &'static str {
        match self {
            CheckType::CheckIn => "Check-In",
            CheckType::CheckOut => "Check-Out",
        }
    }
}

/// One accepted check-in or check-out event, as persisted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    pub user_id: Option<u64>,
    pub check_type: CheckType,
    pub latitude: f64,
    pub longitude: f64,
    pub location_id: u64,
    pub location_verified: bool,
    pub face_verified: bool,
    pub face_confidence: Option<f64>,
    pub face_image_path: Option<String>,
    pub liveness_verified: bool,
    pub device_info: Option<String>,
    pub attendance_date: NaiveDate,
    pub is_mock_location: bool,
    pub is_rooted: Option<bool>,
    pub wifi_ssid: Option<String>,
    pub wifi_bssid: Option<String>,
    pub gps_accuracy: Option<f64>,
    pub location_age_ms: Option<u64>,
    pub location_provider: Option<String>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub suspicious_flags: Option<Json<Vec<SuspicionFlag>>>,
    pub is_suspicious: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything the orchestrator has decided about a submission, ready to be
/// written as one row.
#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub employee_id: u64,
    pub user_id: Option<u64>,
    pub check_type: CheckType,
    pub latitude: f64,
    pub longitude: f64,
    pub location_id: u64,
    pub face_confidence: f64,
    pub face_image_path: String,
    pub device_info: Option<String>,
    pub attendance_date: NaiveDate,
    pub is_mock_location: bool,
    pub is_rooted: Option<bool>,
    pub wifi_ssid: Option<String>,
    pub wifi_bssid: Option<String>,
    pub gps_accuracy: Option<f64>,
    pub location_age_ms: Option<u64>,
    pub location_provider: Option<String>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub suspicious_flags: Vec<SuspicionFlag>,
    pub is_suspicious: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum InsertError {
    /// unique_daily_attendance violated: a row already exists for this
    /// (employee, check_type, attendance_date). Raced submissions land here.
    Duplicate,
    Db(sqlx::Error),
}

/// System of record for attendance events.
///
/// The submission orchestrator only talks to this trait; `SqlLedger` is the
/// production implementation, tests use an in-memory one.
pub trait AttendanceLedger {
    async fn has_checked_in(&self, employee_id: u64, date: NaiveDate) -> anyhow::Result<bool>;
    async fn has_checked_out(&self, employee_id: u64, date: NaiveDate) -> anyhow::Result<bool>;
    async fn insert(&self, record: NewAttendanceRecord) -> Result<u64, InsertError>;
}

pub struct SqlLedger<'a> {
    pool: &'a MySqlPool,
}

impl<'a> SqlLedger<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    async fn exists(
        &self,
        employee_id: u64,
        date: NaiveDate,
        check_type: CheckType,
    ) -> anyhow::Result<bool> {
        // Fast negative via the cuckoo filter; the unique key on the table
        // stays the authoritative guard either way.
        if !attendance_filter::might_exist(employee_id, date, check_type) {
            return Ok(false);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM attendance_records
                WHERE employee_id = ? AND attendance_date = ? AND check_type = ?
                LIMIT 1
            )
            "#,
        )
        .bind(employee_id)
        .bind(date)
        .bind(check_type.as_ref())
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }
}

impl AttendanceLedger for SqlLedger<'_> {
    async fn has_checked_in(&self, employee_id: u64, date: NaiveDate) -> anyhow::Result<bool> {
        self.exists(employee_id, date, CheckType::CheckIn).await
    }

    async fn has_checked_out(&self, employee_id: u64, date: NaiveDate) -> anyhow::Result<bool> {
        self.exists(employee_id, date, CheckType::CheckOut).await
    }

    async fn insert(&self, record: NewAttendanceRecord) -> Result<u64, InsertError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (employee_id, user_id, check_type, latitude, longitude, location_id,
                 location_verified, face_verified, face_confidence, face_image_path,
                 liveness_verified, device_info, attendance_date,
                 is_mock_location, is_rooted, wifi_ssid, wifi_bssid, gps_accuracy,
                 location_age_ms, location_provider, altitude, speed,
                 suspicious_flags, is_suspicious, created_at)
            VALUES (?, ?, ?, ?, ?, ?, TRUE, TRUE, ?, ?, TRUE, ?, ?,
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.employee_id)
        .bind(record.user_id)
        .bind(record.check_type.as_ref())
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.location_id)
        .bind(record.face_confidence)
        .bind(&record.face_image_path)
        .bind(&record.device_info)
        .bind(record.attendance_date)
        .bind(record.is_mock_location)
        .bind(record.is_rooted)
        .bind(&record.wifi_ssid)
        .bind(&record.wifi_bssid)
        .bind(record.gps_accuracy)
        .bind(record.location_age_ms)
        .bind(&record.location_provider)
        .bind(record.altitude)
        .bind(record.speed)
        .bind(Json(&record.suspicious_flags))
        .bind(record.is_suspicious)
        .bind(record.created_at)
        .execute(self.pool)
        .await;

        match result {
            Ok(res) => {
                attendance_filter::insert(
                    record.employee_id,
                    record.attendance_date,
                    record.check_type,
                );
                Ok(res.last_insert_id())
            }
            Err(e) => {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.code().as_deref() == Some("23000") {
                        return Err(InsertError::Duplicate);
                    }
                }
                Err(InsertError::Db(e))
            }
        }
    }
}

/// Today's check-in/check-out rows for an employee, if present.
pub async fn today_status(
    pool: &MySqlPool,
    employee_id: u64,
    date: NaiveDate,
) -> Result<(Option<AttendanceRecord>, Option<AttendanceRecord>), sqlx::Error> {
    let check_in = fetch_for_day(pool, employee_id, date, CheckType::CheckIn).await?;
    let check_out = fetch_for_day(pool, employee_id, date, CheckType::CheckOut).await?;
    Ok((check_in, check_out))
}

async fn fetch_for_day(
    pool: &MySqlPool,
    employee_id: u64,
    date: NaiveDate,
    check_type: CheckType,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT * FROM attendance_records
        WHERE employee_id = ? AND attendance_date = ? AND check_type = ?
        LIMIT 1
        "#,
    )
    .bind(employee_id)
    .bind(date)
    .bind(check_type.as_ref())
    .fetch_optional(pool)
    .await
}

/// Records for an employee within a date range, newest date first,
/// chronological within each date.
pub async fn by_date_range(
    pool: &MySqlPool,
    employee_id: u64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT * FROM attendance_records
        WHERE employee_id = ? AND attendance_date BETWEEN ? AND ?
        ORDER BY attendance_date DESC, created_at ASC
        "#,
    )
    .bind(employee_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_type_round_trips_through_strings() {
        use std::str::FromStr;

        assert_eq!(CheckType::CheckIn.as_ref(), "check_in");
        assert_eq!(CheckType::CheckOut.to_string(), "check_out");
        assert_eq!(CheckType::from_str("check_out").unwrap(), CheckType::CheckOut);
        assert!(CheckType::from_str("lunch_break").is_err());
    }

    #[test]
    fn check_type_serde_matches_wire_format() {
        assert_eq!(
            serde_json::to_value(CheckType::CheckIn).unwrap(),
            serde_json::json!("check_in")
        );
        let parsed: CheckType = serde_json::from_value(serde_json::json!("check_out")).unwrap();
        assert_eq!(parsed, CheckType::CheckOut);
    }

    #[test]
    fn display_names_for_messages() {
        assert_eq!(CheckType::CheckIn.display_name(), "Check-In");
        assert_eq!(CheckType::CheckOut.display_name(), "Check-Out");
    }
}
