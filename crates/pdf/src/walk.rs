//! 对一个内容流及其绘制的全部内容做脱敏：
//! 字形、图片 XObject、内联图片和表单 XObject。
//!
//! 绘制在区域上的表单 XObject 会以该次绘制的 CTM（`/Matrix` 乘以 `Do` 处的 CTM）
//! 递归改写。每次这样的绘制都得到一份改写后的副本，并使用新的资源名，
//! 因此其它页面或其它绘制共享的表单保持不变。

use std::collections::BTreeSet;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use redactor_core::Rect;

use crate::content::{scrub_operations, XObjectDraw};
use crate::error::{PdfError, Result};
use crate::font::Fonts;
use crate::inline::{self, InlineImage};
use crate::ops::{number, Matrix};
use crate::page::{resolve, resolve_dict};
use crate::pixels::{hits, redact_images, region_to_pixels, whiten_image};
use crate::samples::image_size;

/// 嵌套超过此深度的表单直接删除，不再改写
const MAX_FORM_DEPTH: usize = 12;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Totals {
    pub text_runs_removed: usize,
    pub glyphs_removed: usize,
    pub images_redacted: usize,
    pub forms_rewritten: usize,
}

impl Totals {
    fn add(&mut self, other: Totals) {
        self.text_runs_removed += other.text_runs_removed;
        self.glyphs_removed += other.glyphs_removed;
        self.images_redacted += other.images_redacted;
        self.forms_rewritten += other.forms_rewritten;
    }

    fn is_empty(&self) -> bool {
        *self == Totals::default()
    }
}

/// 改写后的内容流及其所需的资源
#[derive(Debug)]
pub(crate) struct Rewritten {
    pub content: Vec<u8>,
    pub resources: Dictionary,
    pub totals: Totals,
}

fn decode_operations(data: &[u8], label: &str) -> Result<(Vec<Operation>, Vec<InlineImage>)> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok((Vec::new(), Vec::new()));
    }
    let (stripped, images) = inline::extract(data);
    let operations = Content::decode(&stripped)
        .map_err(|e| PdfError::Content(format!("{}: {}", label, e)))?
        .operations;
    Ok((operations, images))
}

fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

fn box_of(obj: Option<&Object>) -> Option<Rect> {
    let values: Vec<f64> = match obj? {
        Object::Array(arr) if arr.len() == 4 => arr.iter().filter_map(number).collect(),
        _ => return None,
    };
    match values.as_slice() {
        [x1, y1, x2, y2] => Some(Rect::from_corners(x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2))),
        _ => None,
    }
}

fn fresh_name(xobjects: &Dictionary, base: &[u8]) -> Vec<u8> {
    (1..)
        .map(|n| {
            let mut name = base.to_vec();
            name.extend_from_slice(format!("_r{}", n).as_bytes());
            name
        })
        .find(|name| !xobjects.has(name))
        .unwrap_or_else(|| base.to_vec())
}

/// 按 `regions`（页面用户空间）改写内容流 `data`，
/// 其用户空间经 `ctm` 映射到页面
pub(crate) fn redact_content(
    doc: &mut Document,
    data: &[u8],
    ctm: Matrix,
    resources: Dictionary,
    regions: &[Rect],
    depth: usize,
    label: &str,
) -> Result<Rewritten> {
    let (operations, mut images) = decode_operations(data, label)?;
    let fonts = Fonts::load(doc, &resources);
    let mut scrubbed = scrub_operations(operations, ctm, &fonts, regions);

    let mut totals = Totals {
        text_runs_removed: scrubbed.text_runs_removed,
        glyphs_removed: scrubbed.glyphs_removed,
        ..Totals::default()
    };
    let mut resources = resources;
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .cloned()
        .unwrap_or_default();
    let mut xobjects_changed = false;

    let image_outcome = redact_images(doc, &xobjects, &scrubbed.draws, regions)?;
    totals.images_redacted += image_outcome.images_redacted;
    let mut dropped: BTreeSet<usize> = image_outcome.dropped_draws;
    for (name, id) in image_outcome.replacements {
        xobjects.set(name, Object::Reference(id));
        xobjects_changed = true;
    }

    let named_spaces = resources
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .cloned();
    for draw in &scrubbed.inline {
        let image = match images.get(draw.image) {
            Some(image) => image,
            None => continue,
        };
        let hit = hits(&draw.ctm, regions);
        if hit.is_empty() {
            continue;
        }
        let pixels: Vec<_> = match image_size(&image.dict) {
            Some((w, h)) => hit.iter().filter_map(|r| region_to_pixels(r, &draw.ctm, w, h)).collect(),
            None => Vec::new(),
        };
        if pixels.is_empty() {
            continue;
        }
        let stream = image.to_stream();
        match whiten_image(doc, &stream.dict, &stream.content, named_spaces.as_ref(), &pixels)? {
            Some(edited) => {
                log::info!("[Redact] {}: 内联图片已涂白 {} 处", label, pixels.len());
                images[draw.image] = InlineImage::from_stream(edited);
                totals.images_redacted += 1;
            }
            None => {
                log::warn!("[Redact] {}: 内联图片无法解码，已删除", label);
                dropped.insert(draw.index);
            }
        }
    }

    for draw in &scrubbed.draws {
        if dropped.contains(&draw.index) {
            continue;
        }
        match rewrite_form(doc, &xobjects, &resources, draw, regions, depth, label)? {
            FormEdit::Untouched => {}
            FormEdit::Remove => {
                dropped.insert(draw.index);
            }
            FormEdit::Replaced { id, totals: inner } => {
                let name = fresh_name(&xobjects, &draw.name);
                xobjects.set(name.clone(), Object::Reference(id));
                xobjects_changed = true;
                scrubbed.operations[draw.index] = Operation::new("Do", vec![Object::Name(name)]);
                totals.add(inner);
                totals.forms_rewritten += 1;
            }
        }
    }

    let operations: Vec<Operation> = scrubbed
        .operations
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !dropped.contains(index))
        .map(|(_, op)| op)
        .collect();

    // 不再被绘制的名字从资源中移除，以便清理时一并删除
    let painted = painted_names(&operations);
    for draw in &scrubbed.draws {
        if !painted.contains(&draw.name) && xobjects.remove(&draw.name).is_some() {
            xobjects_changed = true;
        }
    }
    if xobjects_changed {
        resources.set("XObject", Object::Dictionary(xobjects));
    }

    let content = inline::encode(operations, &images)?;

    Ok(Rewritten {
        content,
        resources,
        totals,
    })
}

fn painted_names(operations: &[Operation]) -> BTreeSet<Vec<u8>> {
    operations
        .iter()
        .filter(|op| op.operator == "Do")
        .filter_map(|op| match op.operands.first() {
            Some(Object::Name(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

enum FormEdit {
    Untouched,
    Remove,
    Replaced { id: ObjectId, totals: Totals },
}

fn is_form(stream: &Stream) -> bool {
    matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form")
}

fn rewrite_form(
    doc: &mut Document,
    xobjects: &Dictionary,
    parent_resources: &Dictionary,
    draw: &XObjectDraw,
    regions: &[Rect],
    depth: usize,
    label: &str,
) -> Result<FormEdit> {
    let form = match xobjects.get(&draw.name).ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Stream(stream)) if is_form(stream) => stream.clone(),
        _ => return Ok(FormEdit::Untouched),
    };

    let matrix = match form.dict.get(b"Matrix") {
        Ok(Object::Array(arr)) => Matrix::from_operands(arr).unwrap_or(Matrix::IDENTITY),
        _ => Matrix::IDENTITY,
    };
    let form_ctm = matrix.then(&draw.ctm);
    let painted = box_of(form.dict.get(b"BBox").ok()).map(|bbox| form_ctm.transform_rect(&bbox));
    if let Some(painted) = painted {
        if !regions.iter().any(|r| r.intersects(&painted)) {
            return Ok(FormEdit::Untouched);
        }
    }

    let form_label = format!("{} > /{}", label, String::from_utf8_lossy(&draw.name));
    if depth >= MAX_FORM_DEPTH {
        log::warn!("[Redact] {}: 表单嵌套过深，删除该次绘制", form_label);
        return Ok(FormEdit::Remove);
    }

    let resources = form
        .dict
        .get(b"Resources")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .unwrap_or(parent_resources)
        .clone();
    let inner = redact_content(
        doc,
        &stream_bytes(&form),
        form_ctm,
        resources,
        regions,
        depth + 1,
        &form_label,
    )?;
    if inner.totals.is_empty() {
        return Ok(FormEdit::Untouched);
    }

    let mut dict = form.dict.clone();
    for key in [b"Filter".as_slice(), b"DecodeParms".as_slice(), b"Length".as_slice()] {
        dict.remove(key);
    }
    dict.set("Resources", Object::Dictionary(inner.resources));
    let mut stream = Stream::new(dict, inner.content);
    if let Err(e) = stream.compress() {
        log::debug!("[Redact] {}: 表单流未压缩: {}", form_label, e);
    }
    let id = doc.add_object(stream);
    log::info!(
        "[Redact] {}: 改写为 {:?}（{} 段文字，{} 张图片）",
        form_label,
        id,
        inner.totals.text_runs_removed,
        inner.totals.images_redacted
    );

    Ok(FormEdit::Replaced {
        id,
        totals: inner.totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn form(doc: &mut Document, content: &[u8], extra: Dictionary) -> ObjectId {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        for (key, value) in extra.iter() {
            dict.set(key.clone(), value.clone());
        }
        doc.add_object(Stream::new(dict, content.to_vec()))
    }

    fn form_content(doc: &Document, resources: &Dictionary, name: &[u8]) -> Vec<u8> {
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let id = xobjects.get(name).unwrap().as_reference().unwrap();
        stream_bytes(doc.get_object(id).unwrap().as_stream().unwrap())
    }

    #[test]
    fn test_form_text_is_scrubbed_in_a_copy() {
        let mut doc = Document::with_version("1.7");
        let fm = form(&mut doc, b"BT /F1 10 Tf 100 700 Td (Secret) Tj ET", Dictionary::new());
        let resources = dictionary! { "XObject" => dictionary! { "Fm1" => Object::Reference(fm) } };
        let regions = [Rect::new(95.0, 690.0, 50.0, 30.0)];

        let out = redact_content(
            &mut doc,
            b"q /Fm1 Do Q",
            Matrix::IDENTITY,
            resources,
            &regions,
            0,
            "page",
        )
        .unwrap();

        assert_eq!(out.totals.forms_rewritten, 1);
        assert_eq!(out.totals.text_runs_removed, 1);
        assert_eq!(String::from_utf8_lossy(&out.content), "q\n/Fm1_r1 Do\nQ");
        let rewritten = form_content(&doc, &out.resources, b"Fm1_r1");
        assert!(!String::from_utf8_lossy(&rewritten).contains("Secret"));
        // 此处不再引用原表单，但原表单的文字仍保留给其它使用者
        let xobjects = out.resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(!xobjects.has(b"Fm1"));
        let original = stream_bytes(doc.get_object(fm).unwrap().as_stream().unwrap());
        assert!(String::from_utf8_lossy(&original).contains("Secret"));
    }

    #[test]
    fn test_form_painted_twice_keeps_its_name_for_the_untouched_paint() {
        let mut doc = Document::with_version("1.7");
        let fm = form(&mut doc, b"BT /F1 10 Tf 100 700 Td (Secret) Tj ET", Dictionary::new());
        let resources = dictionary! { "XObject" => dictionary! { "Fm1" => Object::Reference(fm) } };
        let regions = [Rect::new(95.0, 690.0, 50.0, 30.0)];

        let content = b"q /Fm1 Do Q q 1 0 0 1 0 -500 cm /Fm1 Do Q";
        let out = redact_content(&mut doc, content, Matrix::IDENTITY, resources, &regions, 0, "page").unwrap();
        assert_eq!(out.totals.forms_rewritten, 1);
        let xobjects = out.resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.has(b"Fm1"));
        assert!(xobjects.has(b"Fm1_r1"));
    }

    #[test]
    fn test_form_matrix_and_ctm_place_the_form() {
        let mut doc = Document::with_version("1.7");
        let extra = dictionary! {
            "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), (-600).into()],
        };
        let fm = form(&mut doc, b"BT /F1 10 Tf 0 700 Td (Moved) Tj ET", extra);
        let resources = dictionary! { "XObject" => dictionary! { "Fm1" => Object::Reference(fm) } };

        // 文字落在页面的 (300, 100)
        let content = b"q 1 0 0 1 300 0 cm /Fm1 Do Q";
        let miss = [Rect::new(0.0, 690.0, 100.0, 30.0)];
        let out = redact_content(&mut doc, content, Matrix::IDENTITY, resources.clone(), &miss, 0, "page").unwrap();
        assert!(out.totals.is_empty());

        let hit = [Rect::new(295.0, 95.0, 50.0, 20.0)];
        let out = redact_content(&mut doc, content, Matrix::IDENTITY, resources, &hit, 0, "page").unwrap();
        assert_eq!(out.totals.glyphs_removed, 5);
    }

    #[test]
    fn test_nested_form_and_its_image() {
        let mut doc = Document::with_version("1.7");
        let image = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0; 4],
        ));
        let inner = form(
            &mut doc,
            b"q 100 0 0 100 100 600 cm /Im1 Do Q",
            dictionary! {
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im1" => Object::Reference(image) },
                },
            },
        );
        let outer = form(
            &mut doc,
            b"/Inner Do",
            dictionary! {
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Inner" => Object::Reference(inner) },
                },
            },
        );
        let resources = dictionary! { "XObject" => dictionary! { "Outer" => Object::Reference(outer) } };
        let regions = [Rect::new(100.0, 650.0, 50.0, 50.0)];

        let out = redact_content(&mut doc, b"/Outer Do", Matrix::IDENTITY, resources, &regions, 0, "page").unwrap();
        assert_eq!(out.totals.images_redacted, 1);
        assert_eq!(out.totals.forms_rewritten, 2);
    }

    #[test]
    fn test_inline_image_in_region_is_whitened() {
        let mut doc = Document::with_version("1.7");
        let data: &[u8] = b"q 100 0 0 100 100 600 cm BI /W 2 /H 2 /CS /G /BPC 8 ID \x00\x00\x00\x00\nEI Q";
        let regions = [Rect::new(100.0, 650.0, 50.0, 50.0)];
        let out = redact_content(&mut doc, data, Matrix::IDENTITY, Dictionary::new(), &regions, 0, "page").unwrap();
        assert_eq!(out.totals.images_redacted, 1);

        let (_, images) = inline::extract(&out.content);
        assert_eq!(images.len(), 1);
        let stream = images[0].to_stream();
        let samples = if stream.dict.has(b"Filter") {
            let mut plain = stream.clone();
            plain.dict.remove(b"Subtype");
            plain.decompressed_content().unwrap()
        } else {
            stream.content.clone()
        };
        // 左上角像素被涂白，其余不变
        assert_eq!(samples, vec![255, 0, 0, 0]);
    }

    #[test]
    fn test_undecodable_inline_image_is_removed() {
        let mut doc = Document::with_version("1.7");
        let data: &[u8] = b"q 100 0 0 100 100 600 cm BI /W 2 /H 2 /CS /G /BPC 8 /F /JPX ID \x01\x02\nEI Q";
        let regions = [Rect::new(100.0, 650.0, 50.0, 50.0)];
        let out = redact_content(&mut doc, data, Matrix::IDENTITY, Dictionary::new(), &regions, 0, "page").unwrap();
        assert_eq!(String::from_utf8_lossy(&out.content), "q\n100 0 0 100 100 600 cm\nQ");
    }
}
