use serde::Serialize;

use crate::registry::domain::registry_error::RegistryError;
use crate::shared::detection::DetectionResult;

/// Wire form of an alert posted to the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub camera_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl From<&DetectionResult> for Alert {
    fn from(result: &DetectionResult) -> Self {
        Self {
            camera_id: result.camera_id.clone(),
            message: result.message.clone(),
            image_url: None,
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn send_alert(&self, alert: &Alert) -> Result<(), RegistryError>;
}
