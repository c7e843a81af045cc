//! Page rasterisation for signature detection.

mod pdfium;

pub use pdfium::PdfiumRenderer;

use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("pdfium 库不可用: {0}")]
    Bind(String),

    #[error("无法打开待渲染的 PDF: {0}")]
    Load(String),

    #[error("无法访问第 {index} 页: {reason}")]
    Page { index: usize, reason: String },

    #[error("渲染第 {index} 页失败: {reason}")]
    Render { index: usize, reason: String },
}

/// 一个渲染好的页面
pub struct RenderedPage {
    /// 从 0 开始的页码
    pub index: usize,
    pub image: DynamicImage,
    /// 显示时的页面宽度（点，已应用旋转）
    pub width: f64,
    /// 显示时的页面高度（点，已应用旋转）
    pub height: f64,
}

/// 逐页渲染文档，每次把一页交给 `visitor`，
/// 同一时刻只保留一张位图
pub trait PageRenderer {
    fn render_pages(
        &self,
        pdf: &[u8],
        zoom: f32,
        visitor: &mut dyn FnMut(RenderedPage),
    ) -> Result<(), RenderError>;
}
