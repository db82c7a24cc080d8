use std::cmp::Ordering;

use super::result::RawBox;

/// Class-aware non-maximum suppression, in place.
///
/// Survivors are left sorted by descending confidence. A box is dropped when
/// it overlaps an already kept box of the same class by more than `iou_threshold`.
pub fn non_max_suppression(boxes: &mut Vec<RawBox>, iou_threshold: f32) {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    let mut kept = 0;
    for index in 0..boxes.len() {
        let suppressed = (0..kept).any(|prev| {
            boxes[prev].class_index == boxes[index].class_index
                && boxes[prev].bbox.iou(&boxes[index].bbox) > iou_threshold
        });
        if !suppressed {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}
