use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use redactor_core::{parse_rectangles, Rectangle};
use redactor_detect::{
    BoxedModel, DetectError, DetectorSettings, InitPolicy, ModelLoader, ModelSlot, OnnxSignatureModel,
    SignatureDetector, PADDING_FRACTION,
};
use redactor_render::PdfiumRenderer;

use crate::config::AppConfig;

/// 输入必须存在且扩展名为 `.pdf`（不区分大小写）
pub fn check_pdf_path(path: &Path) -> anyhow::Result<()> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        bail!(
            "invalid file type: only PDF files are allowed, got {}",
            path.display()
        );
    }
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }
    Ok(())
}

/// 与输入同目录的 `<dir>/<stem><suffix>`
pub fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}{}", stem, suffix))
}

pub fn read_pdf(path: &Path) -> anyhow::Result<Vec<u8>> {
    check_pdf_path(path)?;
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// 严格解析：格式错误的文件视为错误
pub fn read_rectangles(path: &Path) -> anyhow::Result<Vec<Rectangle>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_rectangles(&raw).with_context(|| format!("invalid rectangles in {}", path.display()))
}

/// 已知签名的宽松解析：无法读取或格式错误时记录日志，
/// 按空列表处理。
pub fn read_existing(path: Option<&Path>) -> Vec<Rectangle> {
    let Some(path) = path else {
        return Vec::new();
    };
    match read_rectangles(path) {
        Ok(rects) => rects,
        Err(e) => {
            tracing::warn!("忽略已有签名: {:#}", e);
            Vec::new()
        }
    }
}

pub fn resolve_confidence(flag: Option<f64>, config: &AppConfig) -> anyhow::Result<f64> {
    let confidence = flag.unwrap_or(config.confidence);
    if !(0.0..=1.0).contains(&confidence) {
        bail!("confidence must be between 0.0 and 1.0, got {}", confidence);
    }
    Ok(confidence)
}

/// 绑定 pdfium 并准备模型槽。`failFast` 时在这里加载模型，
/// 否则在第一次检测时加载。
pub fn build_detector(config: &AppConfig) -> anyhow::Result<SignatureDetector> {
    let renderer = PdfiumRenderer::new(config.pdfium_path.as_deref())
        .context("signature detection needs the pdfium library")?;

    let model_path = config.model_path.clone();
    let loader: ModelLoader = Box::new(move || -> Result<BoxedModel, DetectError> {
        let model = OnnxSignatureModel::new(&model_path)?;
        Ok(Box::new(model) as BoxedModel)
    });
    let policy = if config.fail_fast {
        InitPolicy::FailFast
    } else {
        InitPolicy::FailSoft
    };
    let slot = ModelSlot::new(loader, policy)
        .with_context(|| format!("failed to load {}", config.model_path.display()))?;

    let settings = DetectorSettings {
        zoom: config.zoom,
        iou_threshold: config.iou_threshold,
        padding: PADDING_FRACTION,
    };
    Ok(SignatureDetector::with_settings(
        Box::new(renderer),
        Arc::new(slot),
        settings,
    ))
}

/// 模型无法加载时返回错误，便于调用方区分“没有签名”
/// 和“检测不可用”。
pub fn require_available(detector: &SignatureDetector) -> anyhow::Result<()> {
    if !detector.is_available() {
        bail!("signature detection is not available: the model could not be loaded");
    }
    Ok(())
}
