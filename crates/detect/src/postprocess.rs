//! 像素框转换为页面矩形

use redactor_core::Rectangle;

use crate::model::ScoredBox;

/// 每边额外扩展的框尺寸比例
pub const PADDING_FRACTION: f64 = 0.05;

pub const SIGNATURE_CATEGORY: &str = "Signature";

pub fn signature_label(score: f64) -> String {
    format!("Signature (YOLOS: {:.0}%)", score * 100.0)
}

/// 把渲染图像中的框缩放回页面点坐标，扩边后裁剪到页面内。
/// 框完全不在页面上时返回 `None`。
pub fn to_page_rectangle(
    page_index: usize,
    scored: &ScoredBox,
    zoom: f32,
    page_width: f64,
    page_height: f64,
    padding: f64,
) -> Option<Rectangle> {
    let zoom = zoom as f64;
    if zoom <= 0.0 {
        return None;
    }

    let (x1, y1) = (scored.x1 as f64 / zoom, scored.y1 as f64 / zoom);
    let (x2, y2) = (scored.x2 as f64 / zoom, scored.y2 as f64 / zoom);
    let (x, width) = pad_and_clip(x1, x2 - x1, padding, page_width);
    let (y, height) = pad_and_clip(y1, y2 - y1, padding, page_height);

    let score = (scored.score as f64).clamp(0.0, 1.0);
    Rectangle::new(page_index, x, y, width, height)
        .ok()?
        .with_text(signature_label(score))
        .with_category(SIGNATURE_CATEGORY)
        .with_confidence(score)
        .ok()
}

fn pad_and_clip(start: f64, size: f64, padding: f64, limit: f64) -> (f64, f64) {
    let pad = size * padding;
    let start = (start - pad).max(0.0);
    let mut size = size + 2.0 * pad;
    if start + size > limit {
        size = limit - start;
    }
    (start, size)
}
