use crate::model::location::{self, AttendanceLocation, LocationRegistry};
use anyhow::Result;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

const ACTIVE_KEY: &str = "active";

/// Active-location list, shared across requests.
///
/// Short TTL: admin edits are rare and a minute of staleness is acceptable
/// for attendance validation; mutations invalidate eagerly anyway.
static LOCATION_CACHE: Lazy<Cache<&'static str, Arc<Vec<AttendanceLocation>>>> =
    Lazy::new(|| {
        Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(60))
            .build()
    });

/// Registry over the currently active locations, from cache or the database.
pub async fn registry(pool: &MySqlPool) -> Result<LocationRegistry> {
    let locations = match LOCATION_CACHE.get(&ACTIVE_KEY).await {
        Some(cached) => cached,
        None => {
            let fresh = Arc::new(location::fetch_active_locations(pool).await?);
            LOCATION_CACHE.insert(ACTIVE_KEY, fresh.clone()).await;
            fresh
        }
    };

    Ok(LocationRegistry::new(locations.as_ref().clone()))
}

/// Drop the cached list after an admin mutation.
pub async fn invalidate() {
    LOCATION_CACHE.invalidate(&ACTIVE_KEY).await;
}

/// Populate the cache at startup so the first submission doesn't pay the
/// database round trip.
pub async fn warmup_location_cache(pool: &MySqlPool) -> Result<()> {
    let locations = location::fetch_active_locations(pool).await?;
    let count = locations.len();
    LOCATION_CACHE.insert(ACTIVE_KEY, Arc::new(locations)).await;

    log::info!("Location cache warmup complete: {} active locations", count);
    Ok(())
}
