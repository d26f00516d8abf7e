use serde::{Deserialize, Serialize};

use crate::shared::detection::Detection;
use crate::shared::gray_frame::GrayFrame;

/// Search parameters for one cascade run.
///
/// Frame dimensions are not part of this: they always come from the
/// decoded frame itself.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeParams {
    pub min_size: i32,
    pub max_size: i32,
    pub shift_factor: f64,
    pub scale_factor: f64,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            min_size: 50,
            max_size: 1000,
            shift_factor: 0.1,
            scale_factor: 1.1,
        }
    }
}

/// Domain interface for face-region classification.
///
/// Implementations are stateless and shared by every camera's detection
/// task, hence `&self` and `Sync`. Results are raw, possibly overlapping
/// hits; see [`super::detection_clusterer`].
pub trait FaceClassifier: Send + Sync {
    fn run_cascade(&self, frame: &GrayFrame, params: &CascadeParams) -> Vec<Detection>;
}
