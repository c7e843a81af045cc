//! 字形级的文字删除
//!
//! 字符串按当前字体的度量（见 [`crate::font`]）切分为字符编码并计算宽度。
//! 删除的编码总是整体移除，不会拆开字节。

use lopdf::{content::Operation, Object, StringFormat};
use redactor_core::Rect;

use crate::font::FontMetrics;
use crate::ops::{real, Matrix};

/// 存放在图形状态中的文字状态参数
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextParams {
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// `Tz / 100`
    pub horizontal_scale: f64,
    pub leading: f64,
    pub rise: f64,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// 重建后 `TJ` 数组中的一个元素
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Piece {
    Glyphs(Vec<u8>),
    /// 删除字形后在文字空间中留下的水平位移
    Gap(f64),
}

#[derive(Debug, Default)]
pub(crate) struct ShownRun {
    pub pieces: Vec<Piece>,
    /// 文字空间中的总位移
    pub advance: f64,
    pub removed: usize,
}

/// 从文字空间偏移 `start` 开始遍历字符串的编码，
/// 删除字形框与任一区域（用户空间）相交的编码
pub(crate) fn scrub_glyphs(
    bytes: &[u8],
    start: f64,
    params: &TextParams,
    font: &FontMetrics,
    text_to_user: &Matrix,
    regions: &[Rect],
) -> ShownRun {
    let mut run = ShownRun::default();
    let mut kept: Vec<u8> = Vec::new();
    let mut gap = 0.0;
    let mut x = start;

    let size = params.font_size;
    let bottom = params.rise - 0.2 * size;
    let height = size.abs().max(f64::EPSILON);

    let mut rest = bytes;
    while !rest.is_empty() {
        let code = font.next_code(rest);
        let (glyph_bytes, tail) = rest.split_at(code.len);
        rest = tail;

        let glyph_width = font.width(code) * size;
        let width = glyph_width * params.horizontal_scale;
        let mut advance = glyph_width + params.char_spacing;
        if code.is_word_space() {
            advance += params.word_spacing;
        }
        advance *= params.horizontal_scale;

        let glyph = Rect::new(x, bottom, width.abs().max(f64::EPSILON), height);
        let user = text_to_user.transform_rect(&glyph);

        if regions.iter().any(|region| region.intersects(&user)) {
            if !kept.is_empty() {
                run.pieces.push(Piece::Glyphs(std::mem::take(&mut kept)));
            }
            gap += advance;
            run.removed += 1;
        } else {
            if gap != 0.0 {
                run.pieces.push(Piece::Gap(gap));
                gap = 0.0;
            }
            kept.extend_from_slice(glyph_bytes);
        }
        x += advance;
    }

    if !kept.is_empty() {
        run.pieces.push(Piece::Glyphs(kept));
    }
    if gap != 0.0 {
        run.pieces.push(Piece::Gap(gap));
    }
    run.advance = x - start;
    run
}

/// 把片段转换为 `TJ` 数组元素。空隙变成负向调整的数字，
/// 保证后面的字形位置不变
pub(crate) fn pieces_to_array(pieces: Vec<Piece>, format: StringFormat, params: &TextParams) -> Vec<Object> {
    let unit = params.font_size * params.horizontal_scale;
    pieces
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Glyphs(bytes) => Some(Object::String(bytes, format)),
            Piece::Gap(advance) if unit != 0.0 => Some(real(-advance * 1000.0 / unit)),
            Piece::Gap(_) => None,
        })
        .collect()
}

/// 处理一个文字显示操作符的结果
pub(crate) struct ShowOutcome {
    pub operations: Vec<Operation>,
    pub advance: f64,
    pub removed: usize,
}

/// 处理 `Tj`、`'`、`"` 和 `TJ`
///
/// 对于 `'` 和 `"`，调用方已经把文字矩阵移到下一行，
/// 并应用了 `"` 的间距操作数。
pub(crate) fn scrub_show(
    operation: Operation,
    params: &TextParams,
    font: &FontMetrics,
    text_to_user: &Matrix,
    regions: &[Rect],
) -> ShowOutcome {
    let operator = operation.operator.clone();
    let elements: Vec<Object> = match operator.as_str() {
        "TJ" => match operation.operands.first() {
            Some(Object::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        },
        "\"" => operation.operands.get(2).cloned().into_iter().collect(),
        _ => operation.operands.first().cloned().into_iter().collect(),
    };

    let mut x = 0.0;
    let mut removed = 0;
    let mut rebuilt: Vec<Object> = Vec::with_capacity(elements.len());

    for element in elements {
        match element {
            Object::String(bytes, format) => {
                let run = scrub_glyphs(&bytes, x, params, font, text_to_user, regions);
                x += run.advance;
                if run.removed > 0 {
                    removed += run.removed;
                    rebuilt.extend(pieces_to_array(run.pieces, format, params));
                } else {
                    rebuilt.push(Object::String(bytes, format));
                }
            }
            Object::Integer(_) | Object::Real(_) => {
                if let Some(n) = crate::ops::number(&element) {
                    x -= n / 1000.0 * params.font_size * params.horizontal_scale;
                }
                rebuilt.push(element);
            }
            other => rebuilt.push(other),
        }
    }

    if removed == 0 {
        return ShowOutcome {
            operations: vec![operation],
            advance: x,
            removed,
        };
    }

    let mut operations = Vec::new();
    match operator.as_str() {
        "'" => operations.push(Operation::new("T*", vec![])),
        "\"" => {
            let mut operands = operation.operands.into_iter();
            if let (Some(aw), Some(ac)) = (operands.next(), operands.next()) {
                operations.push(Operation::new("Tw", vec![aw]));
                operations.push(Operation::new("Tc", vec![ac]));
            }
            operations.push(Operation::new("T*", vec![]));
        }
        _ => {}
    }
    operations.push(Operation::new("TJ", vec![Object::Array(rebuilt)]));

    ShowOutcome {
        operations,
        advance: x,
        removed,
    }
}
