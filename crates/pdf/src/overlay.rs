//! 绘制在页面内容之上的不透明白色填充

use lopdf::content::{Content, Operation};
use redactor_core::Rect;

use crate::error::{PdfError, Result};
use crate::ops::real;

/// 为用户空间中的区域生成 `q 1 1 1 rg <x y w h re f>... Q`，只填充不描边
pub(crate) fn white_fill(regions: &[Rect]) -> Vec<Operation> {
    let mut operations = Vec::with_capacity(regions.len() * 2 + 3);
    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new("rg", vec![real(1.0), real(1.0), real(1.0)]));

    for rect in regions {
        log::debug!(
            "[Overlay] 填充 x={:.2} y={:.2} w={:.2} h={:.2}",
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
        operations.push(Operation::new(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        ));
        operations.push(Operation::new("f", vec![]));
    }

    operations.push(Operation::new("Q", vec![]));
    operations
}

pub(crate) fn encode(operations: Vec<Operation>) -> Result<Vec<u8>> {
    Content { operations }
        .encode()
        .map_err(|e| PdfError::Content(e.to_string()))
}

/// 提取 `re` 的操作数，供整个 crate 的测试使用
#[cfg(test)]
pub(crate) fn filled_rects(data: &[u8]) -> Vec<[f64; 4]> {
    let content = match Content::decode(data) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    content
        .operations
        .iter()
        .filter(|op| op.operator == "re")
        .filter_map(|op| {
            let v: Vec<f64> = op.operands.iter().filter_map(crate::ops::number).collect();
            match v.as_slice() {
                [x, y, w, h] => Some([*x, *y, *w, *h]),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_is_wrapped_and_white() {
        let ops = white_fill(&[Rect::new(10.0, 20.0, 30.0, 40.0)]);
        let operators: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(operators, vec!["q", "rg", "re", "f", "Q"]);

        let data = encode(ops).unwrap();
        assert_eq!(filled_rects(&data), vec![[10.0, 20.0, 30.0, 40.0]]);
        let text = String::from_utf8_lossy(&data);
        assert!(!text.contains(" S"));
    }
}
