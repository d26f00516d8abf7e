use std::fs;
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use thiserror::Error;

use crate::detection::domain::face_classifier::{CascadeParams, FaceClassifier};
use crate::shared::detection::Detection;
use crate::shared::gray_frame::GrayFrame;

const HEADER_LEN: usize = 8;
const MAX_TREE_DEPTH: u32 = 16;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cascade data truncated at byte {offset}: need {needed} more bytes")]
    Truncated { offset: usize, needed: usize },
    #[error("unsupported tree depth {0}")]
    InvalidDepth(u32),
    #[error("cascade contains no trees")]
    Empty,
}

/// Pixel-intensity-comparison cascade of binary decision trees.
///
/// Every internal node compares two pixels whose offsets from the window
/// centre are stored as signed fractions of the window size, so one
/// decoded cascade scans any window size without resampling the image.
#[derive(Debug)]
pub struct PicoCascade {
    tree_depth: u32,
    tree_count: usize,
    /// `4 * 2^depth` codes per tree; the first four of each tree are padding.
    codes: Vec<i8>,
    /// `2^depth` leaf outputs per tree.
    predictions: Vec<f32>,
    thresholds: Vec<f32>,
}

impl PicoCascade {
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let data = fs::read(path).map_err(|e| CascadeError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::unpack(&data)
    }

    /// Decodes a cascade blob.
    ///
    /// Layout after an 8-byte header: `u32` tree depth, `u32` tree count,
    /// then per tree `4 * 2^depth - 4` node codes, `2^depth` `f32` leaf
    /// outputs and one `f32` threshold. All integers are little-endian.
    pub fn unpack(data: &[u8]) -> Result<Self, CascadeError> {
        let mut cursor = ByteCursor::new(data);
        cursor.take(HEADER_LEN)?;

        let tree_depth = cursor.read_u32()?;
        if tree_depth == 0 || tree_depth > MAX_TREE_DEPTH {
            return Err(CascadeError::InvalidDepth(tree_depth));
        }
        let tree_count = cursor.read_u32()? as usize;
        if tree_count == 0 {
            return Err(CascadeError::Empty);
        }

        let leaves = 1usize << tree_depth;
        // Counts come from the blob; don't trust them for preallocation.
        let mut codes = Vec::with_capacity(data.len());
        let mut predictions = Vec::new();
        let mut thresholds = Vec::new();

        for _ in 0..tree_count {
            codes.extend_from_slice(&[0, 0, 0, 0]);
            codes.extend(cursor.take(4 * leaves - 4)?.iter().map(|&b| b as i8));
            for _ in 0..leaves {
                predictions.push(cursor.read_f32()?);
            }
            thresholds.push(cursor.read_f32()?);
        }

        Ok(Self {
            tree_depth,
            tree_count,
            codes,
            predictions,
            thresholds,
        })
    }

    pub fn tree_depth(&self) -> u32 {
        self.tree_depth
    }

    pub fn tree_count(&self) -> usize {
        self.tree_count
    }

    /// Confidence that the `scale`-sized window centred on (`row`, `col`)
    /// holds a face; anything `<= 0` is a rejection. Windows reaching
    /// outside the frame are rejected.
    fn classify_region(&self, row: i32, col: i32, scale: i32, pixels: &ArrayView2<'_, u8>) -> f32 {
        let leaves = 1usize << self.tree_depth;
        let r = row * 256;
        let c = col * 256;
        let mut out = 0.0f32;
        let mut root = 0usize;

        for tree in 0..self.tree_count {
            let mut idx = 1usize;
            for _ in 0..self.tree_depth {
                let node = &self.codes[root + 4 * idx..root + 4 * idx + 4];
                let p1 = pixel_at(
                    pixels,
                    (r + node[0] as i32 * scale) >> 8,
                    (c + node[1] as i32 * scale) >> 8,
                );
                let p2 = pixel_at(
                    pixels,
                    (r + node[2] as i32 * scale) >> 8,
                    (c + node[3] as i32 * scale) >> 8,
                );
                let (Some(p1), Some(p2)) = (p1, p2) else {
                    return -1.0;
                };
                idx = 2 * idx + usize::from(p1 <= p2);
            }

            out += self.predictions[leaves * tree + idx - leaves];
            if out <= self.thresholds[tree] {
                return -1.0;
            }
            root += 4 * leaves;
        }

        out - self.thresholds[self.tree_count - 1]
    }
}

impl FaceClassifier for PicoCascade {
    fn run_cascade(&self, frame: &GrayFrame, params: &CascadeParams) -> Vec<Detection> {
        let pixels = frame.as_ndarray();
        let (rows, cols) = (frame.height() as i32, frame.width() as i32);
        let mut detections = Vec::new();
        let mut scale = params.min_size.max(1);

        while scale <= params.max_size {
            let step = ((params.shift_factor * scale as f64) as i32).max(1);
            let offset = scale / 2 + 1;

            let mut row = offset;
            while row <= rows - offset {
                let mut col = offset;
                while col <= cols - offset {
                    let score = self.classify_region(row, col, scale, &pixels);
                    if score > 0.0 {
                        detections.push(Detection::new(row, col, scale, score));
                    }
                    col += step;
                }
                row += step;
            }

            let next = (scale as f64 * params.scale_factor) as i32;
            if next <= scale {
                break;
            }
            scale = next;
        }

        detections
    }
}

fn pixel_at(pixels: &ArrayView2<'_, u8>, row: i32, col: i32) -> Option<u8> {
    if row < 0 || col < 0 {
        return None;
    }
    pixels.get((row as usize, col as usize)).copied()
}

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CascadeError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(CascadeError::Truncated {
                offset: self.pos,
                needed: end - self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, CascadeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f32(&mut self) -> Result<f32, CascadeError> {
        Ok(f32::from_bits(self.read_u32()?))
    }
}
