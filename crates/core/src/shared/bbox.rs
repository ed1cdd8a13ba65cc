//! Axis-aligned boxes as `[x1, y1, x2, y2]` in frame pixels.

/// IoU between two bounding boxes.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
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

/// Shifts every coordinate of `bbox` by `delta * steps`.
pub fn bbox_advance(bbox: &[f64; 4], delta: &[f64; 4], steps: f64) -> [f64; 4] {
    let mut out = *bbox;
    for (o, d) in out.iter_mut().zip(delta) {
        *o += d * steps;
    }
    out
}

/// Per-coordinate difference `b - a`.
pub fn bbox_delta(a: &[f64; 4], b: &[f64; 4]) -> [f64; 4] {
    [b[0] - a[0], b[1] - a[1], b[2] - a[2], b[3] - a[3]]
}
