use std::sync::Arc;

use crate::registry::domain::alert_sink::{Alert, AlertSink};
use crate::shared::detection::DetectionResult;

/// Fire-and-forget delivery of detection alerts.
///
/// Each result is sent at most once. Failures are logged and the alert is
/// dropped; nothing is queued or retried.
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Returns whether the sink accepted the alert.
    pub fn dispatch(&self, result: &DetectionResult) -> bool {
        log::info!(
            "ALERT: found {} face(s) on camera {}",
            result.face_count,
            result.camera_id
        );
        match self.sink.send_alert(&Alert::from(result)) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Dropping alert for camera {}: {e}", result.camera_id);
                false
            }
        }
    }
}
