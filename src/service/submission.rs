use crate::model::attendance::{AttendanceLedger, CheckType, InsertError, NewAttendanceRecord};
use crate::model::fraud::{self, LocationTelemetry, SuspicionFlag};
use crate::model::location::LocationRegistry;
use crate::service::face::FaceVerifier;
use crate::service::image_store::FaceImageStore;
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::path::PathBuf;
use tracing::{info, warn};

/// Fixed minimum similarity for attendance. The gateway's own advisory
/// minimum is lower (it also serves enrollment flows) and is ignored here.
pub const MIN_FACE_CONFIDENCE: f64 = 80.0;

/// The authenticated identity a submission runs under, resolved upstream.
#[derive(Debug, Clone)]
pub struct EmployeeContext {
    pub employee_id: u64,
    pub user_id: Option<u64>,
    /// Enrolled reference photo, if any. Absence is a face-processing
    /// failure, not a crash.
    pub reference_photo: Option<PathBuf>,
}

/// A fully validated submission payload (image already base64-decoded).
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub check_type: CheckType,
    pub latitude: f64,
    pub longitude: f64,
    pub face_image: Vec<u8>,
    pub liveness_verified: bool,
    pub device_info: Option<String>,
    pub telemetry: LocationTelemetry,
    pub wifi_ssid: Option<String>,
    pub wifi_bssid: Option<String>,
    pub location_provider: Option<String>,
    pub altitude: Option<f64>,
}

/// Routine, user-facing rejections. These are control flow, not failures:
/// nothing is persisted when one is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionRejection {
    AlreadyCheckedIn,
    MustCheckInFirst,
    AlreadyCheckedOut,
    OutsideRadius {
        nearest: Option<NearestLocation>,
    },
    LivenessFailed,
    FaceMismatch {
        confidence: f64,
    },
    FaceProcessingFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearestLocation {
    pub name: String,
    pub distance_meters: f64,
    pub radius_meters: u32,
}

impl SubmissionRejection {
    pub fn user_message(&self) -> String {
        match self {
            SubmissionRejection::AlreadyCheckedIn => {
                "You have already checked in today".to_string()
            }
            SubmissionRejection::MustCheckInFirst => {
                "You must check in before checking out".to_string()
            }
            SubmissionRejection::AlreadyCheckedOut => {
                "You have already checked out today".to_string()
            }
            SubmissionRejection::OutsideRadius { nearest } => match nearest {
                Some(n) => format!(
                    "Your location is outside the allowed radius. Nearest location: {} ({:.0} m away, allowed within {} m). Submission rejected.",
                    n.name, n.distance_meters, n.radius_meters
                ),
                None => {
                    "Your location is outside the allowed radius. Submission rejected.".to_string()
                }
            },
            SubmissionRejection::LivenessFailed => {
                "Liveness verification failed. Blink and move your head during capture. Submission rejected."
                    .to_string()
            }
            SubmissionRejection::FaceMismatch { confidence } => format!(
                "Face verification failed: similarity too low ({:.1}% < {:.0}%). Submission rejected.",
                confidence, MIN_FACE_CONFIDENCE
            ),
            SubmissionRejection::FaceProcessingFailed => {
                "Face verification could not be processed. Submission rejected.".to_string()
            }
        }
    }
}

#[derive(Debug)]
pub enum SubmissionError {
    Rejected(SubmissionRejection),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for SubmissionError {
    fn from(e: anyhow::Error) -> Self {
        SubmissionError::Internal(e)
    }
}

impl From<SubmissionRejection> for SubmissionError {
    fn from(r: SubmissionRejection) -> Self {
        SubmissionError::Rejected(r)
    }
}

/// What an accepted submission looks like to the caller.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub id: u64,
    pub check_type: CheckType,
    pub created_at: DateTime<Utc>,
    pub attendance_date: NaiveDate,
    pub location_id: u64,
    pub location_name: String,
    pub face_confidence: f64,
    pub suspicious_flags: Vec<SuspicionFlag>,
    pub is_suspicious: bool,
    pub message: String,
}

/// The atomic accept/reject decision for one check-in/check-out submission.
///
/// Steps run in order and the first failure wins; nothing is persisted until
/// every gate has passed. The fraud evaluation (step 5) only annotates.
pub async fn submit<L, F, S>(
    ledger: &L,
    registry: &LocationRegistry,
    verifier: &F,
    images: &S,
    employee: &EmployeeContext,
    request: SubmissionRequest,
) -> Result<SubmissionOutcome, SubmissionError>
where
    L: AttendanceLedger,
    F: FaceVerifier,
    S: FaceImageStore,
{
    let now_local = Local::now();
    let attendance_date = now_local.date_naive();
    // Record timestamp is UTC; the image path below keys off the local wall
    // clock so its directory agrees with attendance_date.
    let created_at = now_local.with_timezone(&Utc);
    let employee_id = employee.employee_id;

    // 1. Idempotency/sequencing. Fast path only; the unique key catches races.
    match request.check_type {
        CheckType::CheckIn => {
            if ledger.has_checked_in(employee_id, attendance_date).await? {
                return Err(SubmissionRejection::AlreadyCheckedIn.into());
            }
        }
        CheckType::CheckOut => {
            if !ledger.has_checked_in(employee_id, attendance_date).await? {
                return Err(SubmissionRejection::MustCheckInFirst.into());
            }
            if ledger.has_checked_out(employee_id, attendance_date).await? {
                return Err(SubmissionRejection::AlreadyCheckedOut.into());
            }
        }
    }

    // 2. Location containment.
    let location = match registry.find_containing(request.latitude, request.longitude) {
        Some(loc) => loc.clone(),
        None => {
            // Nearest-location diagnostics for the operator; never blocks the
            // rejection itself.
            let nearest =
                registry
                    .find_nearest(request.latitude, request.longitude)
                    .map(|n| NearestLocation {
                        name: n.name.clone(),
                        distance_meters: n.distance_from(request.latitude, request.longitude),
                        radius_meters: n.radius_meters,
                    });
            return Err(SubmissionRejection::OutsideRadius { nearest }.into());
        }
    };

    // 3. Liveness claim (client-asserted).
    if !request.liveness_verified {
        return Err(SubmissionRejection::LivenessFailed.into());
    }

    // 4. Face verification against the enrolled reference photo. The server
    // recomputes confidence; whatever the client claimed is never trusted.
    let reference = match &employee.reference_photo {
        Some(path) => path,
        None => {
            warn!(employee_id, "No reference photo enrolled");
            return Err(SubmissionRejection::FaceProcessingFailed.into());
        }
    };

    let comparison = verifier.compare(reference, &request.face_image).await;
    if !comparison.success {
        warn!(employee_id, message = %comparison.message, "Face comparison failed");
        return Err(SubmissionRejection::FaceProcessingFailed.into());
    }
    if comparison.confidence < MIN_FACE_CONFIDENCE {
        return Err(SubmissionRejection::FaceMismatch {
            confidence: comparison.confidence,
        }
        .into());
    }

    // 5. Fraud signals: annotate, never reject.
    let assessment = fraud::evaluate(&request.telemetry);

    // 6. Persist: capture first, then the record. The image write is
    // append-only and uniquely keyed, so a failed insert just deletes it.
    let image_path = images
        .save(
            employee.user_id.unwrap_or(employee_id),
            request.check_type,
            now_local.naive_local(),
            &request.face_image,
        )
        .await?;

    let record = NewAttendanceRecord {
        employee_id,
        user_id: employee.user_id,
        check_type: request.check_type,
        latitude: request.latitude,
        longitude: request.longitude,
        location_id: location.id,
        face_confidence: comparison.confidence,
        face_image_path: image_path.clone(),
        device_info: request.device_info,
        attendance_date,
        is_mock_location: request.telemetry.is_mock_location,
        is_rooted: Some(request.telemetry.is_rooted),
        wifi_ssid: request.wifi_ssid,
        wifi_bssid: request.wifi_bssid,
        gps_accuracy: request.telemetry.gps_accuracy,
        location_age_ms: request.telemetry.location_age_ms,
        location_provider: request.location_provider,
        altitude: request.altitude,
        speed: request.telemetry.speed,
        suspicious_flags: assessment.flags.clone(),
        is_suspicious: assessment.is_suspicious,
        created_at,
    };

    let id = match ledger.insert(record).await {
        Ok(id) => id,
        Err(InsertError::Duplicate) => {
            // Lost a race with a concurrent submission: same outcome as the
            // step-1 fast path would have produced.
            images.delete(&image_path).await;
            let rejection = match request.check_type {
                CheckType::CheckIn => SubmissionRejection::AlreadyCheckedIn,
                CheckType::CheckOut => SubmissionRejection::AlreadyCheckedOut,
            };
            return Err(rejection.into());
        }
        Err(InsertError::Db(e)) => {
            images.delete(&image_path).await;
            return Err(SubmissionError::Internal(e.into()));
        }
    };

    let mut message = format!("{} recorded successfully", request.check_type.display_name());
    if assessment.is_suspicious {
        message.push_str(" (Flagged for review)");
    }

    info!(
        employee_id,
        record_id = id,
        check_type = %request.check_type,
        location = %location.name,
        confidence = comparison.confidence,
        is_suspicious = assessment.is_suspicious,
        "Attendance recorded"
    );

    Ok(SubmissionOutcome {
        id,
        check_type: request.check_type,
        created_at,
        attendance_date,
        location_id: location.id,
        location_name: location.name,
        face_confidence: comparison.confidence,
        suspicious_flags: assessment.flags,
        is_suspicious: assessment.is_suspicious,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::location::AttendanceLocation;
    use crate::service::face::FaceComparison;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::path::Path;

    #[derive(Default)]
    struct MemoryLedger {
        rows: RefCell<HashSet<(u64, NaiveDate, CheckType)>>,
        inserted: RefCell<Vec<NewAttendanceRecord>>,
        next_id: Cell<u64>,
        duplicate_on_insert: Cell<bool>,
    }

    impl AttendanceLedger for MemoryLedger {
        async fn has_checked_in(&self, employee_id: u64, date: NaiveDate) -> anyhow::Result<bool> {
            Ok(self
                .rows
                .borrow()
                .contains(&(employee_id, date, CheckType::CheckIn)))
        }

        async fn has_checked_out(&self, employee_id: u64, date: NaiveDate) -> anyhow::Result<bool> {
            Ok(self
                .rows
                .borrow()
                .contains(&(employee_id, date, CheckType::CheckOut)))
        }

        async fn insert(&self, record: NewAttendanceRecord) -> Result<u64, InsertError> {
            if self.duplicate_on_insert.get() {
                return Err(InsertError::Duplicate);
            }
            let key = (record.employee_id, record.attendance_date, record.check_type);
            if !self.rows.borrow_mut().insert(key) {
                return Err(InsertError::Duplicate);
            }
            self.inserted.borrow_mut().push(record);
            self.next_id.set(self.next_id.get() + 1);
            Ok(self.next_id.get())
        }
    }

    struct StubVerifier {
        calls: Cell<u32>,
        result: FaceComparison,
    }

    impl StubVerifier {
        fn confident(confidence: f64) -> Self {
            Self {
                calls: Cell::new(0),
                result: FaceComparison {
                    success: true,
                    matched: confidence >= MIN_FACE_CONFIDENCE,
                    confidence,
                    distance: Some(0.3),
                    message: String::new(),
                },
            }
        }

        fn failing() -> Self {
            Self {
                calls: Cell::new(0),
                result: FaceComparison::failure("backend down"),
            }
        }
    }

    impl FaceVerifier for StubVerifier {
        async fn compare(&self, _reference: &Path, _candidate: &[u8]) -> FaceComparison {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct StubStore {
        saves: RefCell<Vec<String>>,
        deletes: RefCell<Vec<String>>,
    }

    impl FaceImageStore for StubStore {
        async fn save(
            &self,
            user_id: u64,
            check_type: CheckType,
            at: chrono::NaiveDateTime,
            _bytes: &[u8],
        ) -> anyhow::Result<String> {
            let path = format!(
                "attendance/{}/{}_{}_{}.jpg",
                at.format("%Y-%m-%d"),
                user_id,
                check_type.as_ref(),
                at.format("%H%M%S"),
            );
            self.saves.borrow_mut().push(path.clone());
            Ok(path)
        }

        async fn delete(&self, relative_path: &str) {
            self.deletes.borrow_mut().push(relative_path.to_string());
        }
    }

    fn office_registry() -> LocationRegistry {
        LocationRegistry::new(vec![AttendanceLocation {
            id: 7,
            name: "Head Office".to_string(),
            address: None,
            latitude: -6.2,
            longitude: 106.8,
            radius_meters: 100,
            is_active: true,
        }])
    }

    fn employee() -> EmployeeContext {
        EmployeeContext {
            employee_id: 10023,
            user_id: Some(42),
            reference_photo: Some(PathBuf::from("/photos/10023.jpg")),
        }
    }

    fn request(check_type: CheckType) -> SubmissionRequest {
        SubmissionRequest {
            check_type,
            latitude: -6.2,
            longitude: 106.8,
            face_image: b"jpegbytes".to_vec(),
            liveness_verified: true,
            device_info: Some("Pixel 8".to_string()),
            telemetry: LocationTelemetry::default(),
            wifi_ssid: None,
            wifi_bssid: None,
            location_provider: Some("fused".to_string()),
            altitude: None,
        }
    }

    fn rejection(err: SubmissionError) -> SubmissionRejection {
        match err {
            SubmissionError::Rejected(r) => r,
            SubmissionError::Internal(e) => panic!("expected rejection, got internal: {}", e),
        }
    }

    #[tokio::test]
    async fn clean_check_in_is_accepted_and_persisted() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let outcome = submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckIn),
        )
        .await
        .unwrap();

        assert_eq!(outcome.location_id, 7);
        assert_eq!(outcome.location_name, "Head Office");
        assert_eq!(outcome.face_confidence, 92.0);
        assert!(!outcome.is_suspicious);
        assert_eq!(outcome.message, "Check-In recorded successfully");

        assert_eq!(ledger.inserted.borrow().len(), 1);
        assert_eq!(store.saves.borrow().len(), 1);

        let record = &ledger.inserted.borrow()[0];
        assert_eq!(record.employee_id, 10023);
        assert_eq!(record.face_confidence, 92.0);
        assert_eq!(record.face_image_path, store.saves.borrow()[0]);
    }

    #[tokio::test]
    async fn second_check_in_same_day_rejects() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();
        let registry = office_registry();
        let emp = employee();

        submit(&ledger, &registry, &verifier, &store, &emp, request(CheckType::CheckIn))
            .await
            .unwrap();

        let err = submit(&ledger, &registry, &verifier, &store, &emp, request(CheckType::CheckIn))
            .await
            .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::AlreadyCheckedIn);
        // The second attempt short-circuited before the gateway.
        assert_eq!(verifier.calls.get(), 1);
        assert_eq!(ledger.inserted.borrow().len(), 1);
    }

    #[tokio::test]
    async fn check_out_requires_check_in_first() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let err = submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckOut),
        )
        .await
        .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::MustCheckInFirst);
        assert_eq!(verifier.calls.get(), 0);
        assert!(ledger.inserted.borrow().is_empty());
    }

    #[tokio::test]
    async fn full_day_cycle_then_double_check_out_rejects() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();
        let registry = office_registry();
        let emp = employee();

        submit(&ledger, &registry, &verifier, &store, &emp, request(CheckType::CheckIn))
            .await
            .unwrap();
        submit(&ledger, &registry, &verifier, &store, &emp, request(CheckType::CheckOut))
            .await
            .unwrap();

        let err = submit(&ledger, &registry, &verifier, &store, &emp, request(CheckType::CheckOut))
            .await
            .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::AlreadyCheckedOut);
        assert_eq!(ledger.inserted.borrow().len(), 2);
    }

    #[tokio::test]
    async fn outside_radius_rejects_without_touching_gateway_or_storage() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let mut req = request(CheckType::CheckIn);
        // ~5.5 km east of the office
        req.longitude = 106.85;

        let err = submit(&ledger, &office_registry(), &verifier, &store, &employee(), req)
            .await
            .unwrap_err();

        match rejection(err) {
            SubmissionRejection::OutsideRadius { nearest } => {
                let nearest = nearest.expect("nearest diagnostics");
                assert_eq!(nearest.name, "Head Office");
                assert_eq!(nearest.radius_meters, 100);
                assert!(nearest.distance_meters > 5000.0);
            }
            other => panic!("unexpected rejection: {:?}", other),
        }

        assert_eq!(verifier.calls.get(), 0);
        assert!(store.saves.borrow().is_empty());
        assert!(ledger.inserted.borrow().is_empty());
    }

    #[tokio::test]
    async fn outside_radius_with_no_locations_still_rejects() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let err = submit(
            &ledger,
            &LocationRegistry::default(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckIn),
        )
        .await
        .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::OutsideRadius { nearest: None });
    }

    #[tokio::test]
    async fn liveness_failure_rejects_before_face_verification() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let mut req = request(CheckType::CheckIn);
        req.liveness_verified = false;

        let err = submit(&ledger, &office_registry(), &verifier, &store, &employee(), req)
            .await
            .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::LivenessFailed);
        assert_eq!(verifier.calls.get(), 0);
    }

    #[tokio::test]
    async fn confidence_exactly_at_threshold_passes() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(80.0);
        let store = StubStore::default();

        let outcome = submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckIn),
        )
        .await
        .unwrap();

        assert_eq!(outcome.face_confidence, 80.0);
    }

    #[tokio::test]
    async fn confidence_just_below_threshold_rejects() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(79.99);
        let store = StubStore::default();

        let err = submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckIn),
        )
        .await
        .unwrap_err();

        assert_eq!(
            rejection(err),
            SubmissionRejection::FaceMismatch { confidence: 79.99 }
        );
        assert!(ledger.inserted.borrow().is_empty());
        assert!(store.saves.borrow().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_rejects_as_processing_error() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::failing();
        let store = StubStore::default();

        let err = submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckIn),
        )
        .await
        .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::FaceProcessingFailed);
    }

    #[tokio::test]
    async fn missing_reference_photo_rejects_as_processing_error() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let mut emp = employee();
        emp.reference_photo = None;

        let err = submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &emp,
            request(CheckType::CheckIn),
        )
        .await
        .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::FaceProcessingFailed);
        assert_eq!(verifier.calls.get(), 0);
    }

    #[tokio::test]
    async fn suspicious_telemetry_is_accepted_but_flagged() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let mut req = request(CheckType::CheckIn);
        req.telemetry.is_mock_location = true;

        let outcome = submit(&ledger, &office_registry(), &verifier, &store, &employee(), req)
            .await
            .unwrap();

        assert!(outcome.is_suspicious);
        assert_eq!(outcome.suspicious_flags, vec![SuspicionFlag::MockLocationEnabled]);
        assert!(outcome.message.ends_with("(Flagged for review)"));

        let record = &ledger.inserted.borrow()[0];
        assert!(record.is_suspicious);
        assert!(record.is_mock_location);
    }

    #[tokio::test]
    async fn image_path_date_matches_attendance_date() {
        let ledger = MemoryLedger::default();
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckIn),
        )
        .await
        .unwrap();

        // The capture files under the local attendance date, never the UTC
        // date; in an eastern-offset deployment those differ early morning.
        let record = &ledger.inserted.borrow()[0];
        let expected_prefix = format!("attendance/{}/", record.attendance_date);
        assert!(
            store.saves.borrow()[0].starts_with(&expected_prefix),
            "path {} does not start with {}",
            store.saves.borrow()[0],
            expected_prefix
        );
    }

    #[tokio::test]
    async fn lost_insert_race_rejects_and_rolls_back_the_image() {
        let ledger = MemoryLedger::default();
        ledger.duplicate_on_insert.set(true);
        let verifier = StubVerifier::confident(92.0);
        let store = StubStore::default();

        let err = submit(
            &ledger,
            &office_registry(),
            &verifier,
            &store,
            &employee(),
            request(CheckType::CheckIn),
        )
        .await
        .unwrap_err();

        assert_eq!(rejection(err), SubmissionRejection::AlreadyCheckedIn);
        assert_eq!(store.saves.borrow().len(), 1);
        assert_eq!(*store.deletes.borrow(), store.saves.borrow().clone());
    }
}
