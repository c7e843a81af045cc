//! 图片 XObject 与内联图片的像素级脱敏
//!
//! 只覆盖区域下的像素，图片其余部分保留。
//! 修改后的 XObject 存为新对象，共享原图的其它页面不受影响。

use std::collections::{BTreeMap, BTreeSet};

use image::{DynamicImage, Luma, Rgb};
use imageproc::drawing::draw_filled_rect_mut;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use redactor_core::Rect;

use crate::content::XObjectDraw;
use crate::error::Result;
use crate::ops::Matrix;
use crate::samples::{self, image_size};

/// 像素矩形，左上角原点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ImageOutcome {
    pub images_redacted: usize,
    /// 因图片无法解码而需要删除的 `Do` 操作下标
    pub dropped_draws: BTreeSet<usize>,
    /// 需要指向修改后副本的 XObject 名称
    pub replacements: Vec<(Vec<u8>, ObjectId)>,
}

struct Target {
    id: ObjectId,
    pixels: Vec<PixelRect>,
    draws: Vec<usize>,
}

/// 把用户空间区域映射到以 `ctm` 绘制的图片像素网格
/// （图片占据自身空间中的单位正方形）
pub(crate) fn region_to_pixels(region: &Rect, ctm: &Matrix, width: u32, height: u32) -> Option<PixelRect> {
    let inverse = ctm.invert()?;
    let unit = inverse.transform_rect(region);

    let u0 = unit.x.clamp(0.0, 1.0);
    let u1 = unit.right().clamp(0.0, 1.0);
    let v0 = unit.y.clamp(0.0, 1.0);
    let v1 = unit.bottom().clamp(0.0, 1.0);
    if u1 <= u0 || v1 <= v0 {
        return None;
    }

    let w = width as f64;
    let h = height as f64;
    let x0 = (u0 * w).floor() as u32;
    let x1 = ((u1 * w).ceil() as u32).min(width);
    // 图片行从上到下，单位空间从下到上
    let y0 = ((1.0 - v1) * h).floor() as u32;
    let y1 = (((1.0 - v0) * h).ceil() as u32).min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(PixelRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// 与以 `ctm` 绘制的图片重叠的区域
pub(crate) fn hits<'a>(ctm: &Matrix, regions: &'a [Rect]) -> Vec<&'a Rect> {
    let footprint = ctm.transform_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
    regions.iter().filter(|r| r.intersects(&footprint)).collect()
}

fn is_image(stream: &Stream) -> bool {
    matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image")
}

fn whiten(img: &mut DynamicImage, pixels: &[PixelRect]) {
    for p in pixels {
        if p.width == 0 || p.height == 0 {
            continue;
        }
        let rect = imageproc::rect::Rect::at(p.x as i32, p.y as i32).of_size(p.width, p.height);
        match &mut *img {
            DynamicImage::ImageLuma8(gray) => draw_filled_rect_mut(gray, rect, Luma([255u8])),
            DynamicImage::ImageRgb8(rgb) => draw_filled_rect_mut(rgb, rect, Rgb([255u8, 255, 255])),
            other => {
                let mut rgb = other.to_rgb8();
                draw_filled_rect_mut(&mut rgb, rect, Rgb([255u8, 255, 255]));
                *other = DynamicImage::ImageRgb8(rgb);
            }
        }
    }
}

/// 解码图片、涂白 `pixels` 并重新编码；无法解码时返回 `None`
pub(crate) fn whiten_image(
    doc: &Document,
    dict: &Dictionary,
    content: &[u8],
    named_spaces: Option<&Dictionary>,
    pixels: &[PixelRect],
) -> Result<Option<Stream>> {
    let mut decoded = match samples::decode(doc, dict, content, named_spaces) {
        Some(decoded) => decoded,
        None => return Ok(None),
    };
    whiten(&mut decoded.image, pixels);
    samples::encode(dict, decoded).map(Some)
}

/// 把所有图片 XObject 中位于区域下的像素涂白
///
/// `xobjects` 是绘制所引用的 XObject 字典。与区域相交但无法解码的图片
/// 记录在 [`ImageOutcome::dropped_draws`] 中，由调用方删除其 `Do`。
pub(crate) fn redact_images(
    doc: &mut Document,
    xobjects: &Dictionary,
    draws: &[XObjectDraw],
    regions: &[Rect],
) -> Result<ImageOutcome> {
    let mut outcome = ImageOutcome::default();
    if draws.is_empty() || regions.is_empty() {
        return Ok(outcome);
    }

    let mut targets: BTreeMap<Vec<u8>, Target> = BTreeMap::new();

    for draw in draws {
        let id = match xobjects.get(&draw.name) {
            Ok(Object::Reference(id)) => *id,
            _ => continue,
        };
        let stream = match doc.get_object(id) {
            Ok(Object::Stream(stream)) if is_image(stream) => stream,
            _ => continue,
        };

        let hit = hits(&draw.ctm, regions);
        if hit.is_empty() {
            continue;
        }

        let target = targets.entry(draw.name.clone()).or_insert_with(|| Target {
            id,
            pixels: Vec::new(),
            draws: Vec::new(),
        });
        target.draws.push(draw.index);

        if let Some((w, h)) = image_size(&stream.dict) {
            target
                .pixels
                .extend(hit.iter().filter_map(|r| region_to_pixels(r, &draw.ctm, w, h)));
        }
    }

    for (name, target) in targets {
        let label = String::from_utf8_lossy(&name).into_owned();
        let original = match doc.get_object(target.id) {
            Ok(Object::Stream(stream)) => stream.clone(),
            _ => continue,
        };
        if target.pixels.is_empty() {
            log::debug!("[Redact] 图片 /{} 仅边缘相接", label);
            continue;
        }

        match whiten_image(doc, &original.dict, &original.content, None, &target.pixels)? {
            Some(stream) => {
                let new_id = doc.add_object(stream);
                log::info!(
                    "[Redact] 图片 /{} 已涂白 {} 处，存为 {:?}",
                    label,
                    target.pixels.len(),
                    new_id
                );
                outcome.replacements.push((name, new_id));
                outcome.images_redacted += 1;
            }
            None => {
                log::warn!(
                    "[Redact] 图片 /{} 无法解码，已从页面删除",
                    label
                );
                outcome.dropped_draws.extend(target.draws);
            }
        }
    }

    Ok(outcome)
}
