//! 破坏性脱敏
//!
//! 先收集所有页面的区域，再逐页一次性应用：删除内容流及其绘制的表单 XObject
//! 中位于区域内的字形，覆盖区域下的图片像素（XObject 与内联图片均是），
//! 最后在上面绘制不透明的白色填充。区域内的内容不会留在保存的文件中。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use redactor_core::{group_by_page, Rect, Rectangle};

use crate::error::Result;
use crate::ops::Matrix;
use crate::overlay::{encode, white_fill};
use crate::page::{inherited, page_content, page_ids, set_page_entry, PageGeometry};
use crate::save::{load, save_compacted};
use crate::walk::{redact_content, Totals};

/// 矩形超过显示页面尺寸的该比例即被拒绝
pub const DEFAULT_MAX_REGION_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedactOptions {
    /// 宽或高超过显示页面该比例的矩形会被跳过
    pub max_region_fraction: f64,
}

impl Default for RedactOptions {
    fn default() -> Self {
        Self {
            max_region_fraction: DEFAULT_MAX_REGION_FRACTION,
        }
    }
}

/// 一次脱敏的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub pages_redacted: usize,
    pub regions_applied: usize,
    pub skipped_oversized: usize,
    pub skipped_out_of_range: usize,
    pub text_runs_removed: usize,
    pub images_redacted: usize,
    /// 替换为脱敏副本的表单 XObject 绘制次数
    pub forms_rewritten: usize,
}

/// 待删除的区域，PDF 用户空间
#[derive(Debug, Clone)]
struct PendingRedaction {
    region: Rect,
    label: String,
}

/// 原地脱敏 `rectangles`（显示坐标）
pub fn redact(
    doc: &mut Document,
    rectangles: &[Rectangle],
    options: &RedactOptions,
) -> Result<RedactionReport> {
    let mut report = RedactionReport::default();
    let pages = page_ids(doc);
    let mut pending: BTreeMap<usize, (ObjectId, Vec<PendingRedaction>)> = BTreeMap::new();

    for (page_index, rects) in group_by_page(rectangles) {
        let page_id = match pages.get(page_index) {
            Some(id) => *id,
            None => {
                log::warn!(
                    "[Redact] 页码 {} 超出范围（共 {} 页），跳过 {} 个区域",
                    page_index,
                    pages.len(),
                    rects.len()
                );
                report.skipped_out_of_range += rects.len();
                continue;
            }
        };

        let geometry = PageGeometry::read(doc, page_id);
        let displayed = geometry.displayed_size();
        let max_width = displayed.width * options.max_region_fraction;
        let max_height = displayed.height * options.max_region_fraction;

        for rect in rects {
            if rect.width() > max_width || rect.height() > max_height {
                log::warn!(
                    "[Redact] 第 {} 页: 跳过过大的 {} 区域 {:.1}x{:.1}（上限 {:.1}x{:.1}）",
                    page_index,
                    rect.label(),
                    rect.width(),
                    rect.height(),
                    max_width,
                    max_height
                );
                report.skipped_oversized += 1;
                continue;
            }

            let region = geometry.to_user_space(rect.rect());
            log::info!(
                "[Redact] 第 {} 页（旋转 {}）: {} ({:.1}, {:.1}, {:.1}, {:.1}) -> 用户空间 ({:.1}, {:.1}, {:.1}, {:.1})",
                page_index,
                geometry.rotation,
                rect.label(),
                rect.x(),
                rect.y(),
                rect.width(),
                rect.height(),
                region.x,
                region.y,
                region.width,
                region.height
            );
            pending
                .entry(page_index)
                .or_insert_with(|| (page_id, Vec::new()))
                .1
                .push(PendingRedaction {
                    region,
                    label: rect.label().to_string(),
                });
        }
    }

    for (page_index, (page_id, marks)) in pending {
        let applied = apply_page(doc, page_id, &marks)?;
        log::info!(
            "[Redact] 第 {} 页: 应用 {} 个区域 [{}]，{} 段文字，{} 张图片，{} 个表单",
            page_index,
            marks.len(),
            marks
                .iter()
                .map(|m| m.label.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            applied.text_runs_removed,
            applied.images_redacted,
            applied.forms_rewritten
        );
        report.pages_redacted += 1;
        report.regions_applied += marks.len();
        report.text_runs_removed += applied.text_runs_removed;
        report.images_redacted += applied.images_redacted;
        report.forms_rewritten += applied.forms_rewritten;
    }

    Ok(report)
}

fn apply_page(doc: &mut Document, page_id: ObjectId, marks: &[PendingRedaction]) -> Result<Totals> {
    let regions: Vec<Rect> = marks.iter().map(|m| m.region).collect();

    let data = page_content(doc, page_id)?;
    let resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let label = format!("page {:?}", page_id);
    let rewritten = redact_content(doc, &data, Matrix::IDENTITY, resources, &regions, 0, &label)?;

    let mut content = b"q\n".to_vec();
    content.extend_from_slice(&rewritten.content);
    content.extend_from_slice(b"\nQ\n");
    content.extend(encode(white_fill(&regions))?);

    let stream_id = doc.add_object(Stream::new(Dictionary::new(), content));
    set_page_entry(doc, page_id, "Contents", Object::Reference(stream_id))?;
    set_page_entry(doc, page_id, "Resources", Object::Dictionary(rewritten.resources))?;

    Ok(rewritten.totals)
}

/// 对内存中的文档脱敏并返回压缩后的输出
///
/// 矩形列表为空时原样返回输入
pub fn redact_bytes(
    bytes: &[u8],
    rectangles: &[Rectangle],
    options: &RedactOptions,
) -> Result<(Vec<u8>, RedactionReport)> {
    if rectangles.is_empty() {
        log::info!("[Redact] 没有矩形，原样返回文档");
        return Ok((bytes.to_vec(), RedactionReport::default()));
    }

    let mut doc = load(bytes)?;
    let report = redact(&mut doc, rectangles, options)?;
    let output = save_compacted(&mut doc)?;
    log::info!(
        "[Redact] 完成: {} 页，{} 个区域，{} 个过大，{} 个超出范围，{} -> {} 字节",
        report.pages_redacted,
        report.regions_applied,
        report.skipped_oversized,
        report.skipped_out_of_range,
        bytes.len(),
        output.len()
    );
    Ok((output, report))
}

/// 文件级封装：写出 `output` 时返回 `true`
///
/// 脱敏后的字节全部生成后才创建输出文件，
/// 失败时不会留下不完整的文件。
pub fn redact_file(input: &Path, rectangles: &[Rectangle], output: &Path, options: &RedactOptions) -> bool {
    let bytes = match fs::read(input) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("[Redact] 无法读取 {}: {}", input.display(), e);
            return false;
        }
    };

    let redacted = match redact_bytes(&bytes, rectangles, options) {
        Ok((redacted, _)) => redacted,
        Err(e) => {
            log::error!("[Redact] {} 处理失败: {}", input.display(), e);
            return false;
        }
    };

    match fs::write(output, redacted) {
        Ok(()) => {
            log::info!("[Redact] 已写出 {}", output.display());
            true
        }
        Err(e) => {
            log::error!("[Redact] 无法写入 {}: {}", output.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::filled_rects;
    use crate::testing::*;

    const HELLO: &[u8] = b"BT /F1 12 Tf 100 700 Td (Hello World) Tj ET";

    fn rect(page: usize, x: f64, y: f64, w: f64, h: f64) -> Rectangle {
        Rectangle::new(page, x, y, w, h).unwrap()
    }

    #[test]
    fn test_empty_list_returns_input() {
        let pdf = build_pdf(vec![TestPage::new(HELLO)]);
        let (out, report) = redact_bytes(&pdf, &[], &RedactOptions::default()).unwrap();
        assert_eq!(out, pdf);
        assert_eq!(report, RedactionReport::default());
    }

    #[test]
    fn test_removes_text_under_region() {
        let pdf = build_pdf(vec![TestPage::new(HELLO)]);
        // 用户空间 x 95..135, y 690..715
        let rects = vec![rect(0, 95.0, 77.0, 40.0, 25.0).with_category("Person")];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();

        assert_eq!(report.pages_redacted, 1);
        assert_eq!(report.regions_applied, 1);
        assert_eq!(report.text_runs_removed, 1);

        let text = shown_text(&page_operations(&out, 1));
        assert!(!text.contains("Hello"), "text still present: {}", text);
        assert!(text.contains("World"));

        let fills = filled_rects(&page_content_bytes(&out, 1));
        assert_eq!(fills, vec![[95.0, 690.0, 40.0, 25.0]]);
    }

    #[test]
    fn test_oversized_region_is_skipped() {
        let pdf = build_pdf(vec![TestPage::new(HELLO)]);
        let rects = vec![rect(0, 50.0, 50.0, 400.0, 100.0)];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();

        assert_eq!(report.skipped_oversized, 1);
        assert_eq!(report.pages_redacted, 0);
        assert!(shown_text(&page_operations(&out, 1)).contains("Hello World"));
    }

    #[test]
    fn test_fraction_is_configurable() {
        let pdf = build_pdf(vec![TestPage::new(HELLO)]);
        let rects = vec![rect(0, 50.0, 50.0, 400.0, 100.0)];
        let options = RedactOptions {
            max_region_fraction: 1.0,
        };
        let (_, report) = redact_bytes(&pdf, &rects, &options).unwrap();
        assert_eq!(report.skipped_oversized, 0);
        assert_eq!(report.pages_redacted, 1);
    }

    #[test]
    fn test_out_of_range_page_is_skipped() {
        let pdf = build_pdf(vec![TestPage::new(HELLO)]);
        let rects = vec![rect(5, 10.0, 10.0, 10.0, 10.0), rect(0, 95.0, 77.0, 40.0, 25.0)];
        let (_, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();
        assert_eq!(report.skipped_out_of_range, 1);
        assert_eq!(report.pages_redacted, 1);
    }

    #[test]
    fn test_rotated_page_fill_lands_in_internal_frame() {
        let pdf = build_pdf(vec![TestPage::new(b"").rotated(90)]);
        let rects = vec![rect(0, 100.0, 200.0, 150.0, 20.0)];
        let (out, _) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();
        let fills = filled_rects(&page_content_bytes(&out, 1));
        assert_eq!(fills, vec![[572.0, 542.0, 20.0, 150.0]]);
    }

    #[test]
    fn test_image_pixels_are_whitened_in_a_copy() {
        let draw: &[u8] = b"q 100 0 0 100 100 600 cm /Im1 Do Q";
        let pdf = build_pdf(vec![
            TestPage::new(draw).with_xobject("Im1", rgb_image(10, 10, 0)),
            TestPage::new(draw).with_xobject("Im1", rgb_image(10, 10, 0)),
        ]);
        // 用户坐标 (100, 650, 50, 50)：图片左上四分之一
        let rects = vec![rect(0, 100.0, 92.0, 50.0, 50.0)];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();
        assert_eq!(report.images_redacted, 1);

        let samples = image_samples(&out, 1, "Im1");
        let pixel = |x: usize, y: usize| samples[(y * 10 + x) * 3];
        assert_eq!(pixel(0, 0), 255);
        assert_eq!(pixel(4, 4), 255);
        assert_eq!(pixel(5, 5), 0);
        assert_eq!(pixel(9, 9), 0);

        let shared = image_samples(&out, 2, "Im1");
        assert!(shared.iter().all(|v| *v == 0));
    }

    #[test]
    fn test_undecodable_image_is_dropped() {
        let mut stream = rgb_image(10, 10, 0);
        stream.dict.set("Filter", "JBIG2Decode");
        let pdf = build_pdf(vec![TestPage::new(b"q 100 0 0 100 100 600 cm /Im1 Do Q").with_xobject("Im1", stream)]);
        let rects = vec![rect(0, 100.0, 92.0, 50.0, 50.0)];
        let (out, _) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();

        let ops = page_operations(&out, 1);
        assert!(ops.iter().all(|op| op.operator != "Do"));
    }

    #[test]
    fn test_image_outside_region_is_untouched() {
        let draw: &[u8] = b"q 100 0 0 100 100 600 cm /Im1 Do Q";
        let pdf = build_pdf(vec![TestPage::new(draw).with_xobject("Im1", rgb_image(4, 4, 0))]);
        let rects = vec![rect(0, 300.0, 500.0, 20.0, 20.0)];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();
        assert_eq!(report.images_redacted, 0);
        assert!(page_operations(&out, 1).iter().any(|op| op.operator == "Do"));
        assert!(image_samples(&out, 1, "Im1").iter().all(|v| *v == 0));
    }

    #[test]
    fn test_bilevel_image_is_whitened_not_dropped() {
        let draw: &[u8] = b"q 612 0 0 792 0 0 cm /Im1 Do Q";
        let pdf = build_pdf(vec![TestPage::new(draw).with_xobject("Im1", bilevel_image(16, 16))]);
        // 用户坐标 (100, 672, 20, 20)：像素 x 2..4，第 2 行
        let rects = vec![rect(0, 100.0, 100.0, 20.0, 20.0)];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();
        assert_eq!(report.images_redacted, 1);
        assert!(page_operations(&out, 1).iter().any(|op| op.operator == "Do"));

        let samples = image_samples(&out, 1, "Im1");
        assert_eq!(samples.len(), 256);
        assert_eq!(samples[2 * 16 + 2], 255);
        assert_eq!(samples[2 * 16 + 3], 255);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[255], 0);
    }

    #[test]
    fn test_text_inside_form_is_removed_from_the_file() {
        let form = form_xobject(b"BT /F1 12 Tf 100 700 Td (Secret) Tj ET");
        let pdf = build_pdf(vec![TestPage::new(b"q /Fm1 Do Q").with_xobject("Fm1", form)]);
        let rects = vec![rect(0, 95.0, 77.0, 50.0, 25.0)];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();

        assert_eq!(report.text_runs_removed, 1);
        assert_eq!(report.forms_rewritten, 1);
        let painted: Vec<Vec<u8>> = page_operations(&out, 1)
            .iter()
            .filter(|op| op.operator == "Do")
            .map(|op| op.operands[0].as_name().unwrap().to_vec())
            .collect();
        assert_eq!(painted, vec![b"Fm1_r1".to_vec()]);
        let everything = String::from_utf8_lossy(&all_stream_bytes(&out)).into_owned();
        assert!(!everything.contains("Secret"));
    }

    #[test]
    fn test_two_byte_font_keeps_text_outside_region() {
        let show: &[u8] = b"BT /F2 12 Tf 100 700 Td <00480065006C006C006F00200057006F0072006C0064> Tj ET";
        let pdf = build_pdf(vec![TestPage::new(show).with_font("F2", identity_font())]);
        // 字形宽 6pt，"World" 占用户空间 x 136..166
        let rects = vec![rect(0, 137.0, 77.0, 32.0, 25.0)];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();

        assert_eq!(report.text_runs_removed, 1);
        let text = shown_text(&page_operations(&out, 1));
        assert_eq!(text, "\0H\0e\0l\0l\0o\0 ");
    }

    #[test]
    fn test_inline_image_pixels_are_whitened() {
        let draw: &[u8] = b"q 100 0 0 100 100 600 cm BI /W 2 /H 2 /CS /G /BPC 8 ID \x00\x00\x00\x00\nEI Q";
        let pdf = build_pdf(vec![TestPage::new(draw)]);
        let rects = vec![rect(0, 100.0, 92.0, 50.0, 50.0)];
        let (out, report) = redact_bytes(&pdf, &rects, &RedactOptions::default()).unwrap();
        assert_eq!(report.images_redacted, 1);

        let (_, images) = crate::inline::extract(&page_content_bytes(&out, 1));
        assert_eq!(images.len(), 1);
        let mut stream = images[0].to_stream();
        stream.dict.remove(b"Subtype");
        let samples = if stream.dict.has(b"Filter") {
            stream.decompressed_content().unwrap()
        } else {
            stream.content
        };
        assert_eq!(samples, vec![255, 0, 0, 0]);
    }

    #[test]
    fn test_redact_file_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("in_redacted.pdf");
        fs::write(&input, build_pdf(vec![TestPage::new(HELLO)])).unwrap();

        let rects = vec![rect(0, 95.0, 77.0, 40.0, 25.0)];
        assert!(redact_file(&input, &rects, &output, &RedactOptions::default()));
        let written = fs::read(&output).unwrap();
        assert!(!shown_text(&page_operations(&written, 1)).contains("Hello"));
    }

    #[test]
    fn test_redact_file_failure_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.pdf");
        let output = dir.path().join("broken_redacted.pdf");
        fs::write(&input, b"%PDF-1.7 this is not a document").unwrap();

        let rects = vec![rect(0, 10.0, 10.0, 10.0, 10.0)];
        assert!(!redact_file(&input, &rects, &output, &RedactOptions::default()));
        assert!(!output.exists());
    }
}
