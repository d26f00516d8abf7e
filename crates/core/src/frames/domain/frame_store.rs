use std::path::PathBuf;

use thiserror::Error;

use crate::shared::gray_frame::GrayFrame;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("failed to read sample frame {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode sample frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Access to the most recent sampled frame of each camera.
///
/// The sampler process overwrites each location continuously and without
/// coordination, so `latest_frame` failing is routine and callers are
/// expected to simply try again later.
pub trait FrameStore: Send + Sync {
    /// Where the sampler for `camera_id` should write its frames.
    fn sample_location(&self, camera_id: &str) -> PathBuf;

    fn latest_frame(&self, camera_id: &str) -> Result<GrayFrame, FrameError>;
}
