//! 为 YOLOS 检测器准备页面图像
//!
//! 与模型导出时的图像处理器一致：最短边缩放到 800，
//! 最长边不超过 1333，使用 ImageNet 均值/标准差。

use image::{DynamicImage, RgbImage};
use ndarray::{Array3, Array4};

pub const SHORTEST_EDGE: u32 = 800;
pub const LONGEST_EDGE: u32 = 1333;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 给定尺寸图像缩放后的 `(width, height)`
pub fn resize_dims(width: u32, height: u32) -> (u32, u32) {
    let (width, height) = (width.max(1), height.max(1));
    let min_side = width.min(height) as f64;
    let max_side = width.max(height) as f64;

    let mut size = SHORTEST_EDGE as f64;
    if max_side / min_side * size > LONGEST_EDGE as f64 {
        size = (LONGEST_EDGE as f64 * min_side / max_side).round();
    }
    let size = size.max(1.0);

    if width < height {
        let new_h = (size * height as f64 / width as f64) as u32;
        (size as u32, new_h.max(1))
    } else {
        let new_w = (size * width as f64 / height as f64) as u32;
        (new_w.max(1), size as u32)
    }
}

/// 构建 `[1, 3, H, W]` 输入张量
pub fn prepare_input(img: &DynamicImage) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let (new_w, new_h) = resize_dims(rgb.width(), rgb.height());

    let resized = if (new_w, new_h) == (rgb.width(), rgb.height()) {
        rgb
    } else {
        image::imageops::resize(&rgb, new_w, new_h, image::imageops::FilterType::Triangle)
    };

    normalize_image(&resized).insert_axis(ndarray::Axis(0))
}

fn normalize_image(img: &RgbImage) -> Array3<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut tensor = Array3::<f32>::zeros((3, h, w));

    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[c, y as usize, x as usize]] = (value - MEAN[c]) / STD[c];
        }
    }

    tensor
}
