//! 模型接口与检测 Transformer 输出的解码

use image::DynamicImage;
use ndarray::ArrayViewD;

use crate::error::DetectError;

/// 渲染图像像素坐标下的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

/// 能在页面图像中找出签名框的模型
///
/// 实现返回所有候选框及其得分；
/// 阈值过滤由调用方负责。
pub trait SignatureModel: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<ScoredBox>, DetectError>;
}

/// 把 `logits [1, Q, C+1]` 和 `pred_boxes [1, Q, 4]` 转换为像素框
///
/// 最后一个类别为“无目标”。查询的得分取真实类别中 softmax 概率的最大值。
/// 框为归一化的 `(cx, cy, w, h)`，按 `width` x `height` 缩放。
pub fn decode_detections(
    logits: &ArrayViewD<f32>,
    boxes: &ArrayViewD<f32>,
    width: u32,
    height: u32,
) -> Result<Vec<ScoredBox>, DetectError> {
    let ls = logits.shape();
    let bs = boxes.shape();
    if ls.len() != 3 || bs.len() != 3 || bs[2] != 4 || ls[0] != bs[0] || ls[1] != bs[1] {
        return Err(DetectError::Inference(format!(
            "unexpected output shapes: logits {:?}, boxes {:?}",
            ls, bs
        )));
    }
    let classes = ls[2];
    if classes < 2 {
        return Err(DetectError::Inference(format!(
            "logits need at least one class plus no-object, got {}",
            classes
        )));
    }

    let (w, h) = (width as f32, height as f32);
    let mut out = Vec::with_capacity(ls[1]);

    for q in 0..ls[1] {
        let max_logit = (0..classes)
            .map(|c| logits[[0, q, c]])
            .fold(f32::NEG_INFINITY, f32::max);
        let denom: f32 = (0..classes).map(|c| (logits[[0, q, c]] - max_logit).exp()).sum();
        let score = (0..classes - 1)
            .map(|c| (logits[[0, q, c]] - max_logit).exp() / denom)
            .fold(0.0f32, f32::max);

        let (cx, cy, bw, bh) = (
            boxes[[0, q, 0]],
            boxes[[0, q, 1]],
            boxes[[0, q, 2]],
            boxes[[0, q, 3]],
        );
        out.push(ScoredBox {
            x1: (cx - bw / 2.0) * w,
            y1: (cy - bh / 2.0) * h,
            x2: (cx + bw / 2.0) * w,
            y2: (cy + bh / 2.0) * h,
            score,
        });
    }

    Ok(out)
}
