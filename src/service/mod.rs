pub mod face;
pub mod image_store;
pub mod submission;
