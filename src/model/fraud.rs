use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// GPS accuracy worse than this (meters) is treated as unreliable.
const MAX_GPS_ACCURACY_M: f64 = 100.0;
/// Location fixes older than this are considered replayed/cached.
const MAX_LOCATION_AGE_MS: u64 = 30_000;
/// Nobody walks into the office at 180 km/h.
const MAX_SPEED_MS: f64 = 50.0;

/// Device/location signals reported by the mobile client at submission time.
/// Evaluated once, stored on the record, never recomputed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LocationTelemetry {
    #[serde(default)]
    pub is_mock_location: bool,
    #[serde(default)]
    pub is_rooted: bool,
    pub gps_accuracy: Option<f64>,
    pub location_age_ms: Option<u64>,
    pub speed: Option<f64>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuspicionFlag {
    MockLocationEnabled,
    RootedDevice,
    LowGpsAccuracy,
    StaleLocationData,
    UnrealisticSpeed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FraudAssessment {
    pub flags: Vec<SuspicionFlag>,
    pub is_suspicious: bool,
}

/// Classify a telemetry snapshot into suspicion flags.
///
/// All checks run independently; flags co-occur. Mock location alone is an
/// automatic red flag; any other single flag is not, two or more are needed.
/// The result is advisory: flagged submissions are still accepted and
/// recorded for later review.
pub fn evaluate(telemetry: &LocationTelemetry) -> FraudAssessment {
    let mut flags = Vec::new();

    if telemetry.is_mock_location {
        flags.push(SuspicionFlag::MockLocationEnabled);
    }
    if telemetry.is_rooted {
        flags.push(SuspicionFlag::RootedDevice);
    }
    if matches!(telemetry.gps_accuracy, Some(acc) if acc > MAX_GPS_ACCURACY_M) {
        flags.push(SuspicionFlag::LowGpsAccuracy);
    }
    if matches!(telemetry.location_age_ms, Some(age) if age > MAX_LOCATION_AGE_MS) {
        flags.push(SuspicionFlag::StaleLocationData);
    }
    if matches!(telemetry.speed, Some(speed) if speed > MAX_SPEED_MS) {
        flags.push(SuspicionFlag::UnrealisticSpeed);
    }

    let is_suspicious =
        flags.contains(&SuspicionFlag::MockLocationEnabled) || flags.len() >= 2;

    FraudAssessment { flags, is_suspicious }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_telemetry_has_no_flags() {
        let result = evaluate(&LocationTelemetry::default());
        assert!(result.flags.is_empty());
        assert!(!result.is_suspicious);
    }

    #[test]
    fn mock_location_alone_is_suspicious() {
        let result = evaluate(&LocationTelemetry {
            is_mock_location: true,
            ..Default::default()
        });

        assert_eq!(result.flags, vec![SuspicionFlag::MockLocationEnabled]);
        assert!(result.is_suspicious);
    }

    #[test]
    fn single_non_mock_flag_is_not_suspicious() {
        let result = evaluate(&LocationTelemetry {
            gps_accuracy: Some(150.0),
            ..Default::default()
        });

        assert_eq!(result.flags, vec![SuspicionFlag::LowGpsAccuracy]);
        assert!(!result.is_suspicious);
    }

    #[test]
    fn two_flags_trigger_suspicion() {
        let result = evaluate(&LocationTelemetry {
            gps_accuracy: Some(150.0),
            location_age_ms: Some(40_000),
            ..Default::default()
        });

        assert_eq!(
            result.flags,
            vec![SuspicionFlag::LowGpsAccuracy, SuspicionFlag::StaleLocationData]
        );
        assert!(result.is_suspicious);
    }

    #[test]
    fn rooted_alone_is_not_suspicious() {
        let result = evaluate(&LocationTelemetry {
            is_rooted: true,
            ..Default::default()
        });

        assert_eq!(result.flags, vec![SuspicionFlag::RootedDevice]);
        assert!(!result.is_suspicious);
    }

    #[test]
    fn thresholds_are_exclusive() {
        // Values exactly at the limit do not flag.
        let result = evaluate(&LocationTelemetry {
            gps_accuracy: Some(100.0),
            location_age_ms: Some(30_000),
            speed: Some(50.0),
            ..Default::default()
        });

        assert!(result.flags.is_empty());
        assert!(!result.is_suspicious);
    }

    #[test]
    fn all_signals_at_once() {
        let result = evaluate(&LocationTelemetry {
            is_mock_location: true,
            is_rooted: true,
            gps_accuracy: Some(500.0),
            location_age_ms: Some(120_000),
            speed: Some(90.0),
        });

        assert_eq!(result.flags.len(), 5);
        assert!(result.is_suspicious);
    }

    #[test]
    fn flags_serialize_as_snake_case_tags() {
        assert_eq!(SuspicionFlag::MockLocationEnabled.as_ref(), "mock_location_enabled");
        assert_eq!(
            serde_json::to_value(SuspicionFlag::LowGpsAccuracy).unwrap(),
            serde_json::json!("low_gps_accuracy")
        );
    }
}
