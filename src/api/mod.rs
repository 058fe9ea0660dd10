pub mod attendance_admin;
pub mod employee;
pub mod location_admin;
pub mod mobile_attendance;
