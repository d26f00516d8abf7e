use crate::registry::domain::registry_error::RegistryError;
use crate::shared::camera::Camera;

/// Source of the desired camera set.
///
/// A fetch either yields the complete list or fails as a whole; there is
/// no partial result.
pub trait CameraSource: Send + Sync {
    fn fetch_cameras(&self) -> Result<Vec<Camera>, RegistryError>;
}
