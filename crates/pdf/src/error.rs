//! PDF 引擎错误

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("无法打开 PDF: {0}")]
    Load(String),

    #[error("PDF 结构错误: {0}")]
    Parse(String),

    #[error("内容流错误: {0}")]
    Content(String),

    #[error("图片错误: {0}")]
    Image(String),

    #[error("PDF 序列化失败: {0}")]
    Save(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PdfError>;
