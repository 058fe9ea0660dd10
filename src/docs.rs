use crate::api::attendance_admin::RecordQuery;
use crate::api::location_admin::CreateLocation;
use crate::api::mobile_attendance::{
    CheckEventDto, DayHistory, HistoryQuery, LocationDto, SubmitAttendanceRequest,
    ValidateLocationRequest,
};
use crate::model::attendance::CheckType;
use crate::model::employee::C3aisEmployee;
use crate::model::fraud::{FraudAssessment, LocationTelemetry, SuspicionFlag};
use crate::model::location::AttendanceLocation;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRIS Attendance API",
        version = "1.0.0",
        description = r#"
## Mobile Attendance Backend

This API powers geofenced, face-verified employee attendance for the HRIS
mobile application.

### 🔹 Key Features
- **Mobile Attendance**
  - Check-in / check-out with geofence, face verification and liveness gating
  - Today status, pre-flight location validation, monthly history
- **Location Management**
  - Admin CRUD for geofenced attendance locations
- **Record Management**
  - Admin listing, inspection and deletion of attendance records
- **Fraud Signals**
  - Mock location, rooted device, GPS accuracy, staleness and speed flags
    recorded per submission for later review

### 🔐 Security
All endpoints except `/auth/*` require **JWT Bearer authentication**.
Location and record management require the **Admin** role.

### 📦 Response Format
- JSON-based RESTful responses
- Pagination supported for the record listing endpoint

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::mobile_attendance::get_locations,
        crate::api::mobile_attendance::today_status,
        crate::api::mobile_attendance::validate_location,
        crate::api::mobile_attendance::submit,
        crate::api::mobile_attendance::history,
        crate::api::mobile_attendance::avatar,

        crate::api::location_admin::create_location,
        crate::api::location_admin::list_locations,
        crate::api::location_admin::update_location,
        crate::api::location_admin::delete_location,

        crate::api::attendance_admin::list_records,
        crate::api::attendance_admin::get_record,
        crate::api::attendance_admin::delete_record,

        crate::api::employee::me,
        crate::api::employee::photo
    ),
    components(
        schemas(
            AttendanceLocation,
            CheckType,
            SuspicionFlag,
            LocationTelemetry,
            FraudAssessment,
            C3aisEmployee,
            LocationDto,
            CheckEventDto,
            ValidateLocationRequest,
            SubmitAttendanceRequest,
            HistoryQuery,
            DayHistory,
            CreateLocation,
            RecordQuery
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Mobile Attendance", description = "Employee-facing attendance APIs"),
        (name = "Locations", description = "Attendance location management APIs"),
        (name = "Attendance Records", description = "Attendance record management APIs"),
        (name = "Employee", description = "Employee directory APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
