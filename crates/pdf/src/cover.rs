//! 非破坏性的签名覆盖
//!
//! 原有内容流保持不变：在其前面插入一个 `q` 流，之后追加 `Q` 和白色填充，
//! 这样页面遗留的图形状态不会让覆盖块偏移或变色。

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, Stream};
use redactor_core::{group_by_page, Rectangle};

use crate::error::Result;
use crate::overlay::{encode, white_fill};
use crate::page::{content_refs, page_ids, set_page_entry, PageGeometry};
use crate::save::{load, save_compacted};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverReport {
    pub pages_covered: usize,
    pub regions_covered: usize,
    pub skipped_out_of_range: usize,
}

/// 原地在每个区域上绘制不透明白色矩形，没有尺寸限制
pub fn cover(doc: &mut Document, rectangles: &[Rectangle]) -> Result<CoverReport> {
    let mut report = CoverReport::default();
    let pages = page_ids(doc);

    for (page_index, rects) in group_by_page(rectangles) {
        let page_id = match pages.get(page_index) {
            Some(id) => *id,
            None => {
                log::warn!(
                    "[Cover] 页码 {} 超出范围（共 {} 页），跳过 {} 个区域",
                    page_index,
                    pages.len(),
                    rects.len()
                );
                report.skipped_out_of_range += rects.len();
                continue;
            }
        };

        let geometry = PageGeometry::read(doc, page_id);
        let regions: Vec<_> = rects
            .iter()
            .map(|rect| {
                let region = geometry.to_user_space(rect.rect());
                log::info!(
                    "[Cover] 第 {} 页: {} ({:.1}, {:.1}, {:.1}, {:.1}){}",
                    page_index,
                    rect.label(),
                    rect.x(),
                    rect.y(),
                    rect.width(),
                    rect.height(),
                    rect.confidence()
                        .map(|c| format!(" 置信度 {:.2}", c))
                        .unwrap_or_default()
                );
                region
            })
            .collect();

        let head = encode(vec![Operation::new("q", vec![])])?;
        let mut tail_ops = vec![Operation::new("Q", vec![])];
        tail_ops.extend(white_fill(&regions));
        let tail = encode(tail_ops)?;

        let mut contents = content_refs(doc, page_id)?;
        let head_id = doc.add_object(Stream::new(Dictionary::new(), head));
        let tail_id = doc.add_object(Stream::new(Dictionary::new(), tail));
        contents.insert(0, Object::Reference(head_id));
        contents.push(Object::Reference(tail_id));
        set_page_entry(doc, page_id, "Contents", Object::Array(contents))?;

        report.pages_covered += 1;
        report.regions_covered += regions.len();
    }

    Ok(report)
}

/// 覆盖内存中文档的 `rectangles` 并返回压缩后的输出。
/// 列表为空时原样返回输入。
pub fn cover_signatures(bytes: &[u8], rectangles: &[Rectangle]) -> Result<Vec<u8>> {
    if rectangles.is_empty() {
        log::info!("[Cover] 没有需要覆盖的区域，原样返回文档");
        return Ok(bytes.to_vec());
    }

    let mut doc = load(bytes)?;
    let report = cover(&mut doc, rectangles)?;
    let output = save_compacted(&mut doc)?;
    log::info!(
        "[Cover] 完成: {} 个区域，{} 页，{} 个超出范围",
        report.regions_covered,
        report.pages_covered,
        report.skipped_out_of_range
    );
    Ok(output)
}
