use std::cmp::Ordering;

use crate::shared::detection::Detection;

/// Groups overlapping raw hits so each face is counted once.
///
/// Detections are visited strongest first. Every not-yet-assigned hit
/// seeds a cluster that absorbs all later hits overlapping it by more than
/// `iou_threshold`; the cluster's position and size are the members'
/// averages and its score their sum.
pub fn cluster_detections(detections: &[Detection], iou_threshold: f64) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut assigned = vec![false; sorted.len()];
    let mut clusters = Vec::new();

    for i in 0..sorted.len() {
        if assigned[i] {
            continue;
        }
        let seed = sorted[i];
        let (mut row, mut col, mut scale, mut score, mut n) = (0i64, 0i64, 0i64, 0f32, 0i64);

        for j in i..sorted.len() {
            if assigned[j] || seed.iou(&sorted[j]) <= iou_threshold {
                continue;
            }
            assigned[j] = true;
            row += sorted[j].row as i64;
            col += sorted[j].col as i64;
            scale += sorted[j].scale as i64;
            score += sorted[j].score;
            n += 1;
        }

        if n > 0 {
            clusters.push(Detection::new(
                (row / n) as i32,
                (col / n) as i32,
                (scale / n) as i32,
                score,
            ));
        }
    }
    clusters
}
