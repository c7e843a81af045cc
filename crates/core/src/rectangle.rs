//! 带页码的矩形记录
//!
//! [`Rectangle`] 是调用方（以及签名检测器）交给脱敏与覆盖引擎的数据。
//! 坐标单位为 PDF 点，相对于页面显示时（已应用旋转）的左上角。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::{CoreError, Result};

/// 经过校验、不可变的单页区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRectangle", into = "RawRectangle")]
pub struct Rectangle {
    page_index: usize,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    text: Option<String>,
    category: Option<String>,
    confidence: Option<f64>,
}

/// [`Rectangle`] 的传输格式；必须经过 [`Rectangle::try_from`] 才能使用
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRectangle {
    page_index: i64,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
}

impl Rectangle {
    /// 创建矩形，拒绝负的原点、非正的尺寸和非有限值
    pub fn new(page_index: usize, x: f64, y: f64, width: f64, height: f64) -> Result<Self> {
        check_non_negative("x", x)?;
        check_non_negative("y", y)?;
        check_positive("width", width)?;
        check_positive("height", height)?;

        Ok(Self {
            page_index,
            x,
            y,
            width,
            height,
            text: None,
            category: None,
            confidence: None,
        })
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// 附加检测得分，必须在 `[0, 1]` 内
    pub fn with_confidence(mut self, confidence: f64) -> Result<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(CoreError::invalid(
                "confidence",
                format!("expected a value in [0, 1], got {}", confidence),
            ));
        }
        self.confidence = Some(confidence);
        Ok(self)
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    /// 显示坐标下的几何
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// 用于日志的类别，未提供时为 `Unknown`
    pub fn label(&self) -> &str {
        self.category.as_deref().unwrap_or("Unknown")
    }
}

impl TryFrom<RawRectangle> for Rectangle {
    type Error = CoreError;

    fn try_from(raw: RawRectangle) -> Result<Self> {
        if raw.page_index < 0 {
            return Err(CoreError::invalid(
                "pageIndex",
                format!("must be >= 0, got {}", raw.page_index),
            ));
        }
        let page_index = usize::try_from(raw.page_index)
            .map_err(|e| CoreError::invalid("pageIndex", e.to_string()))?;

        let mut rect = Rectangle::new(page_index, raw.x, raw.y, raw.width, raw.height)?;
        rect.text = raw.text;
        rect.category = raw.category;
        match raw.confidence {
            Some(confidence) => rect.with_confidence(confidence),
            None => Ok(rect),
        }
    }
}

impl From<Rectangle> for RawRectangle {
    fn from(rect: Rectangle) -> Self {
        RawRectangle {
            page_index: rect.page_index as i64,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            text: rect.text,
            category: rect.category,
            confidence: rect.confidence,
        }
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CoreError::invalid(
            field,
            format!("must be a finite value >= 0, got {}", value),
        ));
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::invalid(
            field,
            format!("must be a finite value > 0, got {}", value),
        ));
    }
    Ok(())
}

/// 解析 JSON 矩形数组
///
/// 只要不是数组，或任一元素缺字段、取值非法，整个输入都会被拒绝，
/// 不会部分接受。
pub fn parse_rectangles(json: &str) -> Result<Vec<Rectangle>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        _ => return Err(CoreError::NotAnArray),
    };

    items
        .into_iter()
        .map(|item| {
            let raw: RawRectangle = serde_json::from_value(item)?;
            Rectangle::try_from(raw)
        })
        .collect()
}

/// 按页码分组：页码升序，同页内保持输入顺序
pub fn group_by_page(rectangles: &[Rectangle]) -> BTreeMap<usize, Vec<&Rectangle>> {
    let mut by_page: BTreeMap<usize, Vec<&Rectangle>> = BTreeMap::new();
    for rect in rectangles {
        by_page.entry(rect.page_index).or_default().push(rect);
    }
    by_page
}
