pub mod attendance;
pub mod employee;
pub mod fraud;
pub mod location;
pub mod role;
