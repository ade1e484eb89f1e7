//! Box geometry shared by the detector post-processing.

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Greedy non-maximum suppression over `(box, score)` candidates.
///
/// Returns indices of kept candidates, highest score first, at most
/// `top_k` of them.
pub fn nms(candidates: &[([f32; 4], f32)], iou_thresh: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .1
            .partial_cmp(&candidates[a].1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(top_k);

    let mut keep = Vec::new();
    let mut suppressed = vec![false; order.len()];
    for i in 0..order.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(order[i]);
        for j in (i + 1)..order.len() {
            if !suppressed[j]
                && bbox_iou(&candidates[order[i]].0, &candidates[order[j]].0) > iou_thresh
            {
                suppressed[j] = true;
            }
        }
    }
    keep
}
