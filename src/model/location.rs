use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::ToSchema;

/// Mean Earth radius in meters, as used by the mobile clients.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Head Office",
    "address": "Jl. Jend. Sudirman Kav. 52-53, Jakarta",
    "latitude": -6.2,
    "longitude": 106.8,
    "radius_meters": 100,
    "is_active": true
}))]
pub struct AttendanceLocation {
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
    #[schema(example = true)]
    pub is_active: bool,
}

impl AttendanceLocation {
    /// Great-circle distance from this location's center to the given point,
    /// in meters (Haversine).
    pub fn distance_from(&self, latitude: f64, longitude: f64) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lon_from = self.longitude.to_radians();
        let lat_to = latitude.to_radians();
        let lon_to = longitude.to_radians();

        let lat_delta = lat_to - lat_from;
        let lon_delta = lon_to - lon_from;

        let a = (lat_delta / 2.0).sin().powi(2)
            + lat_from.cos() * lat_to.cos() * (lon_delta / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    pub fn is_within_radius(&self, latitude: f64, longitude: f64) -> bool {
        self.distance_from(latitude, longitude) <= self.radius_meters as f64
    }
}

/// Read-only view over the active attendance locations.
///
/// Built per request from persisted rows (via the moka cache) and handed to
/// whatever needs to resolve coordinates; never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct LocationRegistry {
    locations: Vec<AttendanceLocation>,
}

impl LocationRegistry {
    pub fn new(locations: Vec<AttendanceLocation>) -> Self {
        Self { locations }
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn locations(&self) -> &[AttendanceLocation] {
        &self.locations
    }

    /// First active location whose radius contains the point.
    ///
    /// First match in row order, not nearest: when two radii overlap the
    /// accepted location follows enumeration order. Kept intentionally,
    /// see DESIGN.md.
    pub fn find_containing(&self, latitude: f64, longitude: f64) -> Option<&AttendanceLocation> {
        self.locations
            .iter()
            .find(|loc| loc.is_within_radius(latitude, longitude))
    }

    /// Active location minimizing distance to the point, or `None` when no
    /// active locations exist. Used for rejection diagnostics only.
    pub fn find_nearest(&self, latitude: f64, longitude: f64) -> Option<&AttendanceLocation> {
        self.locations.iter().min_by(|a, b| {
            a.distance_from(latitude, longitude)
                .total_cmp(&b.distance_from(latitude, longitude))
        })
    }
}

/// Fetch the active locations straight from the database.
///
/// Most callers should go through `utils::location_cache` instead.
pub async fn fetch_active_locations(pool: &MySqlPool) -> Result<Vec<AttendanceLocation>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceLocation>(
        r#"
        SELECT id, name, address, latitude, longitude, radius_meters, is_active
        FROM attendance_locations
        WHERE is_active = TRUE
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(id: u64, lat: f64, lon: f64, radius: u32) -> AttendanceLocation {
        AttendanceLocation {
            id,
            name: format!("Site {}", id),
            address: None,
            latitude: lat,
            longitude: lon,
            radius_meters: radius,
            is_active: true,
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = location(1, -6.2, 106.8, 100);
        let b = location(2, -6.3, 106.9, 100);

        let d_ab = a.distance_from(b.latitude, b.longitude);
        let d_ba = b.distance_from(a.latitude, a.longitude);

        assert!((d_ab - d_ba).abs() / d_ab < 1e-6);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = location(1, -6.2, 106.8, 100);
        assert_eq!(a.distance_from(-6.2, 106.8), 0.0);
    }

    #[test]
    fn radius_check_at_equator() {
        // 0.01 degrees of longitude at the equator is ~1113 m.
        let origin = location(1, 0.0, 0.0, 1000);

        assert!(!origin.is_within_radius(0.0, 0.01));
        assert!(origin.is_within_radius(0.0, 0.005));

        let far = origin.distance_from(0.0, 0.01);
        assert!((far - 1113.0).abs() < 5.0, "got {}", far);
    }

    #[test]
    fn find_containing_returns_first_match_in_order() {
        // Two overlapping radii around the same point; row order wins even
        // though the second center is closer.
        let registry = LocationRegistry::new(vec![
            location(1, 0.0, 0.0, 2000),
            location(2, 0.0, 0.005, 2000),
        ]);

        let hit = registry.find_containing(0.0, 0.005).unwrap();
        assert_eq!(hit.id, 1);
    }

    #[test]
    fn find_containing_none_outside_all_radii() {
        let registry = LocationRegistry::new(vec![location(1, 0.0, 0.0, 1000)]);
        assert!(registry.find_containing(1.0, 1.0).is_none());
    }

    #[test]
    fn find_nearest_picks_minimum_distance() {
        let registry = LocationRegistry::new(vec![
            location(1, 0.0, 0.0, 100),
            location(2, 0.0, 0.5, 100),
            location(3, 0.0, 1.0, 100),
        ]);

        assert_eq!(registry.find_nearest(0.0, 0.6).unwrap().id, 2);
    }

    #[test]
    fn empty_registry_answers_none() {
        let registry = LocationRegistry::default();
        assert!(registry.find_containing(0.0, 0.0).is_none());
        assert!(registry.find_nearest(0.0, 0.0).is_none());
    }
}
