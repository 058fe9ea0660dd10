pub mod attendance_filter;
pub mod db_utils;
pub mod location_cache;
