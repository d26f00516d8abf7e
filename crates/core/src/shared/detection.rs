/// A square cascade window that the classifier accepted.
///
/// `row`/`col` locate the window centre, `scale` is its side length in
/// pixels and `score` the classifier's confidence above its final threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub row: i32,
    pub col: i32,
    pub scale: i32,
    pub score: f32,
}

impl Detection {
    pub fn new(row: i32, col: i32, scale: i32, score: f32) -> Self {
        Self {
            row,
            col,
            scale,
            score,
        }
    }

    /// Intersection-over-union of the two square windows.
    pub fn iou(&self, other: &Detection) -> f64 {
        let (r1, c1, s1) = (self.row as f64, self.col as f64, self.scale as f64);
        let (r2, c2, s2) = (other.row as f64, other.col as f64, other.scale as f64);

        let over_row = ((r1 + s1 / 2.0).min(r2 + s2 / 2.0) - (r1 - s1 / 2.0).max(r2 - s2 / 2.0)).max(0.0);
        let over_col = ((c1 + s1 / 2.0).min(c2 + s2 / 2.0) - (c1 - s1 / 2.0).max(c2 - s2 / 2.0)).max(0.0);

        let inter = over_row * over_col;
        if inter == 0.0 {
            return 0.0;
        }
        inter / (s1 * s1 + s2 * s2 - inter)
    }
}

/// Outcome of one detection tick that found at least one face.
///
/// Handed straight to the alert dispatcher and then dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionResult {
    pub camera_id: String,
    pub face_count: usize,
    pub message: String,
}

impl DetectionResult {
    pub fn new(camera_id: impl Into<String>, face_count: usize) -> Self {
        Self {
            camera_id: camera_id.into(),
            face_count,
            message: format!("Detected {face_count} face(s)"),
        }
    }
}
