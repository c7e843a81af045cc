//! 单页的几何信息与内容访问

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use redactor_core::{internal_to_user_space, to_internal, Rect, Rotation, Size};

use crate::error::{PdfError, Result};
use crate::ops::number;

const LETTER: [f64; 4] = [0.0, 0.0, 612.0, 792.0];
const MAX_INHERIT_DEPTH: usize = 32;

/// 按页序排列的页面 id
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// 解引用，返回引用指向的对象
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// 先在页面本身查找属性，再沿 `Pages` 祖先节点查找
/// （`Rotate`、`MediaBox` 和 `Resources` 可继承）
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn box_values(obj: &Object) -> Option<[f64; 4]> {
    let arr = match obj {
        Object::Array(arr) if arr.len() == 4 => arr,
        _ => return None,
    };
    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(arr) {
        *slot = number(item)?;
    }
    let [x1, y1, x2, y2] = values;
    Some([x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)])
}

/// 单页的旋转与 MediaBox，每次调用都重新读取
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_id: ObjectId,
    /// 归一到 `[0, 360)` 的 `/Rotate`
    pub rotation: i64,
    /// 未旋转的原生坐标系 `[llx, lly, urx, ury]`，不受 CropBox 影响
    pub media_box: [f64; 4],
}

impl PageGeometry {
    pub fn read(doc: &Document, page_id: ObjectId) -> Self {
        let rotation = inherited(doc, page_id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360);
        if Rotation::from_degrees(rotation).is_none() {
            log::warn!(
                "[Geometry] 页面 {:?}: 不支持的旋转角度 {}，按 0 处理",
                page_id,
                rotation
            );
        }

        let media_box = inherited(doc, page_id, b"MediaBox")
            .and_then(box_values)
            .unwrap_or_else(|| {
                log::warn!("[Geometry] 页面 {:?} 没有可用的 MediaBox，按 Letter 处理", page_id);
                LETTER
            });

        log::debug!(
            "[Geometry] 页面 {:?}: 旋转={} media_box={:?}",
            page_id,
            rotation,
            media_box
        );

        Self {
            page_id,
            rotation,
            media_box,
        }
    }

    /// 未旋转时的尺寸
    pub fn internal_size(&self) -> Size {
        let [llx, lly, urx, ury] = self.media_box;
        Size::new(urx - llx, ury - lly)
    }

    /// 阅读器中显示的尺寸
    pub fn displayed_size(&self) -> Size {
        let internal = self.internal_size();
        match Rotation::from_degrees(self.rotation) {
            Some(rotation) if rotation.swaps_axes() => Size::new(internal.height, internal.width),
            _ => internal,
        }
    }

    /// 把显示坐标系下的矩形映射到 PDF 用户空间
    pub fn to_user_space(&self, displayed: Rect) -> Rect {
        let internal = to_internal(displayed, self.rotation, self.internal_size());
        internal_to_user_space(internal, self.media_box)
    }
}

/// 页面所有内容流解码后拼接的字节
///
/// 没有 `/Contents` 的页面返回空缓冲区
pub(crate) fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| PdfError::Parse(format!("page {:?}: {}", page_id, e)))?;

    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };

    let mut data = Vec::new();
    match resolve(doc, contents) {
        Some(Object::Stream(stream)) => data.extend(stream_bytes(stream)),
        Some(Object::Array(arr)) => {
            for item in arr {
                if let Some(Object::Stream(stream)) = resolve(doc, item) {
                    data.extend(stream_bytes(stream));
                    data.push(b'\n');
                }
            }
        }
        _ => {
            return Err(PdfError::Parse(format!(
                "page {:?} has an unreadable /Contents entry",
                page_id
            )))
        }
    }
    Ok(data)
}

fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// 以数组形式返回页面的内容流引用，
/// 便于在前后追加流而不改动已有内容
pub(crate) fn content_refs(doc: &mut Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let contents = doc
        .get_dictionary(page_id)
        .map_err(|e| PdfError::Parse(format!("page {:?}: {}", page_id, e)))?
        .get(b"Contents")
        .ok()
        .cloned();

    Ok(match contents {
        None => Vec::new(),
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(arr)) => arr,
        Some(Object::Stream(stream)) => vec![Object::Reference(doc.add_object(stream))],
        Some(other) => {
            return Err(PdfError::Parse(format!(
                "page {:?} has an unexpected /Contents entry: {:?}",
                page_id, other
            )))
        }
    })
}

pub(crate) fn set_page_entry(
    doc: &mut Document,
    page_id: ObjectId,
    key: &str,
    value: Object,
) -> Result<()> {
    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| PdfError::Parse(format!("page {:?}: {}", page_id, e)))?;
    page.set(key, value);
    Ok(())
}
