//! 内容流遍历：跟踪图形与文字状态，删除区域内的字形，
//! 并记录 XObject 和内联图片的绘制位置。

use lopdf::content::Operation;
use lopdf::Object;
use redactor_core::Rect;

use crate::font::{FontMetrics, Fonts};
use crate::inline::placeholder;
use crate::ops::{number, Matrix};
use crate::text::{scrub_show, TextParams};

/// 一次 `Do` 调用及其执行时的 CTM
#[derive(Debug, Clone)]
pub(crate) struct XObjectDraw {
    /// [`Scrubbed::operations`] 中的下标
    pub index: usize,
    pub name: Vec<u8>,
    pub ctm: Matrix,
}

/// 内联图片占位符及其所在位置的 CTM
#[derive(Debug, Clone)]
pub(crate) struct InlineDraw {
    /// [`Scrubbed::operations`] 中的下标
    pub index: usize,
    /// [`crate::inline::extract`] 切出的图片下标
    pub image: usize,
    pub ctm: Matrix,
}

#[derive(Debug, Default)]
pub(crate) struct Scrubbed {
    pub operations: Vec<Operation>,
    pub text_runs_removed: usize,
    pub glyphs_removed: usize,
    pub draws: Vec<XObjectDraw>,
    pub inline: Vec<InlineDraw>,
}

fn operand(op: &Operation, index: usize) -> Option<f64> {
    op.operands.get(index).and_then(number)
}

/// 改写 `operations`，删除字形框与任一区域相交的字形。
/// 区域位于默认用户空间；`ctm` 把内容流的空间映射过去
/// （页面为单位矩阵，表单 XObject 为表单矩阵乘以调用处的 CTM）。
pub(crate) fn scrub_operations(
    operations: Vec<Operation>,
    ctm: Matrix,
    fonts: &Fonts,
    regions: &[Rect],
) -> Scrubbed {
    let mut out = Scrubbed {
        operations: Vec::with_capacity(operations.len()),
        ..Scrubbed::default()
    };

    let mut stack: Vec<(Matrix, TextParams, &FontMetrics)> = Vec::new();
    let mut ctm = ctm;
    let mut params = TextParams::default();
    let mut font = fonts.fallback();
    let mut text_matrix = Matrix::IDENTITY;
    let mut line_matrix = Matrix::IDENTITY;
    let mut in_text = false;

    for op in operations {
        match op.operator.as_str() {
            "q" => stack.push((ctm, params, font)),
            "Q" => {
                if let Some((saved_ctm, saved_params, saved_font)) = stack.pop() {
                    ctm = saved_ctm;
                    params = saved_params;
                    font = saved_font;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    ctm = m.then(&ctm);
                }
            }
            "BT" => {
                in_text = true;
                text_matrix = Matrix::IDENTITY;
                line_matrix = Matrix::IDENTITY;
            }
            "ET" => in_text = false,
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    font = fonts.get(name);
                }
                if let Some(size) = operand(&op, 1) {
                    params.font_size = size.abs();
                }
            }
            "Tc" => params.char_spacing = operand(&op, 0).unwrap_or(params.char_spacing),
            "Tw" => params.word_spacing = operand(&op, 0).unwrap_or(params.word_spacing),
            "Tz" => {
                if let Some(scale) = operand(&op, 0) {
                    params.horizontal_scale = scale / 100.0;
                }
            }
            "TL" => params.leading = operand(&op, 0).unwrap_or(params.leading),
            "Ts" => params.rise = operand(&op, 0).unwrap_or(params.rise),
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (operand(&op, 0), operand(&op, 1)) {
                    if op.operator == "TD" {
                        params.leading = -ty;
                    }
                    line_matrix = Matrix::translate(tx, ty).then(&line_matrix);
                    text_matrix = line_matrix;
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    line_matrix = m;
                    text_matrix = m;
                }
            }
            "T*" => {
                line_matrix = Matrix::translate(0.0, -params.leading).then(&line_matrix);
                text_matrix = line_matrix;
            }
            "Tj" | "TJ" | "'" | "\"" if in_text => {
                if op.operator == "\"" {
                    params.word_spacing = operand(&op, 0).unwrap_or(params.word_spacing);
                    params.char_spacing = operand(&op, 1).unwrap_or(params.char_spacing);
                }
                if op.operator == "'" || op.operator == "\"" {
                    line_matrix = Matrix::translate(0.0, -params.leading).then(&line_matrix);
                    text_matrix = line_matrix;
                }

                let text_to_user = text_matrix.then(&ctm);
                let shown = scrub_show(op, &params, font, &text_to_user, regions);
                text_matrix = Matrix::translate(shown.advance, 0.0).then(&text_matrix);
                if shown.removed > 0 {
                    out.text_runs_removed += 1;
                    out.glyphs_removed += shown.removed;
                }
                out.operations.extend(shown.operations);
                continue;
            }
            "Do" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    out.draws.push(XObjectDraw {
                        index: out.operations.len(),
                        name: name.clone(),
                        ctm,
                    });
                }
            }
            "BI" => {
                if let Some(image) = placeholder(&op) {
                    out.inline.push(InlineDraw {
                        index: out.operations.len(),
                        image,
                        ctm,
                    });
                }
            }
            _ => {}
        }
        out.operations.push(op);
    }

    out
}
