pub mod detection_service;
pub mod detector;
pub mod staging;
