use std::fs;
use std::path::{Path, PathBuf};

use crate::frames::domain::frame_store::{FrameError, FrameStore};
use crate::shared::constants::SAMPLE_FRAME_EXTENSION;
use crate::shared::gray_frame::GrayFrame;

/// Sample frames stored as `<dir>/<camera id>.jpg`, one file per camera.
pub struct FileFrameStore {
    dir: PathBuf,
}

impl FileFrameStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameStore for FileFrameStore {
    fn sample_location(&self, camera_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{SAMPLE_FRAME_EXTENSION}", file_safe_id(camera_id)))
    }

    fn latest_frame(&self, camera_id: &str) -> Result<GrayFrame, FrameError> {
        let path = self.sample_location(camera_id);
        let bytes = fs::read(&path).map_err(|e| FrameError::Read {
            path: path.clone(),
            source: e,
        })?;
        decode_grayscale(&bytes).map_err(|e| FrameError::Decode { path, source: e })
    }
}

/// Decodes an encoded image and converts it to grayscale.
///
/// A file caught mid-write usually fails here rather than at read time.
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayFrame, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    Ok(GrayFrame::from(img.to_luma8()))
}

/// Maps a camera identifier onto a single path component.
///
/// Identifiers made only of `[A-Za-z0-9_-]` are used verbatim. Anything else
/// is sanitised and suffixed with `~` and a hash of the raw identifier, so
/// two identifiers never share a sample file.
fn file_safe_id(camera_id: &str) -> String {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !camera_id.is_empty() && camera_id.chars().all(is_safe) {
        return camera_id.to_string();
    }
    let stem: String = camera_id
        .chars()
        .map(|c| if is_safe(c) { c } else { '_' })
        .collect();
    format!("{stem}~{:016x}", fnv1a(camera_id.as_bytes()))
}

/// 64-bit FNV-1a; stable across builds and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
