//! 基于重叠度的同页矩形去重

use crate::rectangle::Rectangle;

/// IoU 超过该值即视为同一个签名
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// 两个矩形的交并比（忽略页码）
pub fn iou(a: &Rectangle, b: &Rectangle) -> f64 {
    a.rect().iou(&b.rect())
}

/// `candidate` 与 `prior` 中任一同页矩形的 IoU 严格大于 `threshold` 时返回 true
pub fn is_duplicate<'a, I>(candidate: &Rectangle, prior: I, threshold: f64) -> bool
where
    I: IntoIterator<Item = &'a Rectangle>,
{
    prior
        .into_iter()
        .filter(|existing| existing.page_index() == candidate.page_index())
        .any(|existing| iou(candidate, existing) > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(page: usize, x: f64, y: f64, w: f64, h: f64) -> Rectangle {
        Rectangle::new(page, x, y, w, h).unwrap()
    }

    #[test]
    fn test_iou_properties() {
        let a = rect(0, 10.0, 10.0, 40.0, 20.0);
        let b = rect(0, 30.0, 15.0, 40.0, 30.0);
        assert_eq!(iou(&a, &b), iou(&b, &a));
        assert!((iou(&a, &a) - 1.0).abs() < 1e-12);

        let far = rect(0, 200.0, 200.0, 5.0, 5.0);
        assert_eq!(iou(&a, &far), 0.0);

        // 仅边缘相接不算重叠
        let touching = rect(0, 50.0, 10.0, 10.0, 20.0);
        assert_eq!(iou(&a, &touching), 0.0);
    }

    #[test]
    fn test_near_identical_box_is_duplicate() {
        let detected = rect(0, 50.0, 50.0, 100.0, 30.0);
        let existing = vec![rect(0, 48.0, 49.0, 104.0, 32.0)];
        assert!(iou(&detected, &existing[0]) > DEFAULT_IOU_THRESHOLD);
        assert!(is_duplicate(&detected, &existing, DEFAULT_IOU_THRESHOLD));
    }

    #[test]
    fn test_other_pages_are_ignored() {
        let detected = rect(1, 50.0, 50.0, 100.0, 30.0);
        let existing = vec![rect(0, 50.0, 50.0, 100.0, 30.0)];
        assert!(!is_duplicate(&detected, &existing, DEFAULT_IOU_THRESHOLD));
    }

    #[test]
    fn test_threshold_is_strict() {
        // IoU 恰好为 0.5：10x10 位于 10x20 内
        let a = rect(0, 0.0, 0.0, 10.0, 10.0);
        let b = rect(0, 0.0, 0.0, 10.0, 20.0);
        assert!((iou(&a, &b) - 0.5).abs() < 1e-12);
        assert!(!is_duplicate(&a, [&b], 0.5));
        assert!(is_duplicate(&a, [&b], 0.49));
    }

    #[test]
    fn test_empty_prior_set() {
        let a = rect(0, 0.0, 0.0, 10.0, 10.0);
        assert!(!is_duplicate(&a, &Vec::new(), DEFAULT_IOU_THRESHOLD));
    }
}
