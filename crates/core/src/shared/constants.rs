use std::time::Duration;

pub const CASCADE_MODEL_NAME: &str = "facefinder";
pub const CASCADE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/esimov/pigo/master/cascade/facefinder";

pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:3000";
pub const DEFAULT_MEDIA_SERVER_URL: &str = "rtsp://localhost:8554";
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
pub const DEFAULT_FRAMES_DIR: &str = "frames";

/// Time between two reconciliation passes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Cadence of each camera's detection task; matches the sampler's 1 fps output.
pub const DETECTION_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for a single registry GET or alert POST.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Overlap above which raw cascade hits are merged into one face.
pub const CLUSTER_IOU_THRESHOLD: f64 = 0.2;

pub const SAMPLE_FRAME_EXTENSION: &str = "jpg";
