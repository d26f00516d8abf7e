use std::path::Path;

use crate::process::domain::command_spec::CommandSpec;
use crate::shared::camera::Camera;

/// Command-line templates for the two per-camera transcoder processes.
///
/// Only the camera's source address and its identifier-derived outputs
/// vary between cameras.
#[derive(Clone, Debug)]
pub struct PipelineCommands {
    ffmpeg: String,
    media_server_url: String,
}

impl PipelineCommands {
    pub fn new(ffmpeg: impl Into<String>, media_server_url: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            media_server_url: media_server_url.trim_end_matches('/').to_string(),
        }
    }

    /// Where the re-stream for `camera_id` is published.
    pub fn restream_destination(&self, camera_id: &str) -> String {
        format!("{}/{camera_id}", self.media_server_url)
    }

    /// Loops the source forever and republishes it as low-latency H.264
    /// without audio.
    pub fn restream(&self, camera: &Camera) -> CommandSpec {
        CommandSpec::new(
            self.ffmpeg.as_str(),
            [
                "-stream_loop",
                "-1",
                "-re",
                "-i",
                camera.rtsp_url.as_str(),
                "-c:v",
                "libx264",
                "-preset",
                "ultrafast",
                "-bf",
                "0",
                "-an",
                "-f",
                "rtsp",
                self.restream_destination(&camera.id).as_str(),
            ],
        )
    }

    /// Samples one frame per second, overwriting the same image file.
    pub fn sampler(&self, camera: &Camera, sample_path: &Path) -> CommandSpec {
        let sample_path = sample_path.to_string_lossy();
        CommandSpec::new(
            self.ffmpeg.as_str(),
            [
                "-stream_loop",
                "-1",
                "-i",
                camera.rtsp_url.as_str(),
                "-r",
                "1",
                "-update",
                "1",
                "-y",
                &*sample_path,
            ],
        )
    }
}
