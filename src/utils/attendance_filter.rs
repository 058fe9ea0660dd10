use crate::model::attendance::CheckType;
use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use chrono::NaiveDate;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;

/// Sized for roughly a year of daily pairs across the workforce.
const FILTER_CAPACITY: usize = 1_000_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Fast-negative pre-filter for the one-check-in/one-check-out-per-day rule.
///
/// "Not in the filter" means the row definitely does not exist, so the
/// existence query can be skipped. "In the filter" means maybe; the caller
/// falls through to the database, and the unique key on attendance_records
/// remains the authoritative guard.
static ATTENDANCE_FILTER: Lazy<RwLock<CuckooFilter<String>>> = Lazy::new(|| {
    RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE))
});

#[inline]
fn key(employee_id: u64, date: NaiveDate, check_type: CheckType) -> String {
    format!("{}:{}:{}", employee_id, date, check_type.as_ref())
}

/// Check whether a record might exist (false positives possible)
pub fn might_exist(employee_id: u64, date: NaiveDate, check_type: CheckType) -> bool {
    ATTENDANCE_FILTER
        .read()
        .expect("attendance filter poisoned")
        .contains(&key(employee_id, date, check_type))
}

/// Record a successfully persisted event in the filter
pub fn insert(employee_id: u64, date: NaiveDate, check_type: CheckType) {
    ATTENDANCE_FILTER
        .write()
        .expect("attendance filter poisoned")
        .add(&key(employee_id, date, check_type));
}

/// Drop a key after administrative deletion of a record
pub fn remove(employee_id: u64, date: NaiveDate, check_type: CheckType) {
    ATTENDANCE_FILTER
        .write()
        .expect("attendance filter poisoned")
        .remove(&key(employee_id, date, check_type));
}

/// Warm up the filter from recent attendance rows using streaming + batching
pub async fn warmup_attendance_filter(
    pool: &MySqlPool,
    days: u32,
    batch_size: usize,
) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (u64, NaiveDate, String)>(
        r#"
        SELECT employee_id, attendance_date, check_type
        FROM attendance_records
        WHERE attendance_date >= CURDATE() - INTERVAL ? DAY
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (employee_id, date, check_type) =
            row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        let check_type: CheckType = check_type
            .parse()
            .map_err(|_| anyhow!("unknown check_type in attendance_records"))?;

        batch.push(key(employee_id, date, check_type));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!(
        "Attendance filter warmup complete: {} rows (last {} days)",
        total,
        days
    );
    Ok(())
}

fn insert_batch(keys: &[String]) {
    let mut filter = ATTENDANCE_FILTER
        .write()
        .expect("attendance filter poisoned");

    for k in keys {
        filter.add(k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains_then_remove() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        // Unlikely employee id to avoid collisions with other tests sharing
        // the process-wide filter.
        let employee_id = 987_654_321;

        assert!(!might_exist(employee_id, date, CheckType::CheckIn));

        insert(employee_id, date, CheckType::CheckIn);
        assert!(might_exist(employee_id, date, CheckType::CheckIn));
        assert!(!might_exist(employee_id, date, CheckType::CheckOut));

        remove(employee_id, date, CheckType::CheckIn);
        assert!(!might_exist(employee_id, date, CheckType::CheckIn));
    }

    #[test]
    fn keys_distinguish_dates() {
        let employee_id = 123_456_789;
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();

        insert(employee_id, monday, CheckType::CheckOut);
        assert!(!might_exist(employee_id, tuesday, CheckType::CheckOut));

        remove(employee_id, monday, CheckType::CheckOut);
    }
}
