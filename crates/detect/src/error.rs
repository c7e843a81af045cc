//! 检测错误类型

use redactor_render::RenderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("模型加载失败: {0}")]
    ModelLoad(String),

    #[error("图像处理失败: {0}")]
    ImageProcess(String),

    #[error("推理失败: {0}")]
    Inference(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("签名检测不可用: {0}")]
    Unavailable(String),
}
