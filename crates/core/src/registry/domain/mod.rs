pub mod alert_sink;
pub mod camera_source;
pub mod registry_error;
