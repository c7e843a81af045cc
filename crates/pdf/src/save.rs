//! 压缩序列化

use lopdf::Document;

use crate::error::{PdfError, Result};

/// 写出前清理无引用对象、删除空流、重新编号对象（重建交叉引用表）
/// 并压缩流。不做线性化。
pub fn save_compacted(doc: &mut Document) -> Result<Vec<u8>> {
    let before = doc.objects.len();
    doc.prune_objects();
    doc.delete_zero_length_streams();
    doc.renumber_objects();
    doc.compress();

    log::debug!(
        "[Save] 压缩完成: {} -> {} 个对象",
        before,
        doc.objects.len()
    );

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| PdfError::Save(e.to_string()))?;
    Ok(buffer)
}

pub(crate) fn load(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| PdfError::Load(e.to_string()))
}
