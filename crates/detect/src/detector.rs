//! 逐页签名检测

use std::sync::Arc;

use redactor_core::{is_duplicate, Rectangle, DEFAULT_IOU_THRESHOLD};
use redactor_render::{PageRenderer, RenderedPage};

use crate::error::DetectError;
use crate::postprocess::{to_page_rectangle, PADDING_FRACTION};
use crate::slot::ModelSlot;

pub const DEFAULT_ZOOM: f32 = 2.0;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    /// 渲染倍率；2.0 即 144 DPI
    pub zoom: f32,
    pub iou_threshold: f64,
    pub padding: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            padding: PADDING_FRACTION,
        }
    }
}

pub struct SignatureDetector {
    renderer: Box<dyn PageRenderer>,
    model: Arc<ModelSlot>,
    settings: DetectorSettings,
}

impl SignatureDetector {
    pub fn new(renderer: Box<dyn PageRenderer>, model: Arc<ModelSlot>) -> Self {
        Self::with_settings(renderer, model, DetectorSettings::default())
    }

    pub fn with_settings(
        renderer: Box<dyn PageRenderer>,
        model: Arc<ModelSlot>,
        settings: DetectorSettings,
    ) -> Self {
        Self {
            renderer,
            model,
            settings,
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_available()
    }

    /// 每页得分高于 `threshold` 的签名，去掉与 `existing`
    /// 或同页更早检测结果重叠的部分。
    ///
    /// 任何失败都会记录日志并返回空列表。
    pub fn detect(&self, pdf: &[u8], existing: &[Rectangle], threshold: f64) -> Vec<Rectangle> {
        match self.try_detect(pdf, existing, threshold) {
            Ok(found) => found,
            Err(e) => {
                log::error!("[Detect] 签名检测失败: {}", e);
                Vec::new()
            }
        }
    }

    pub fn try_detect(
        &self,
        pdf: &[u8],
        existing: &[Rectangle],
        threshold: f64,
    ) -> Result<Vec<Rectangle>, DetectError> {
        let model = self
            .model
            .get()
            .ok_or_else(|| DetectError::Unavailable("model failed to load".to_string()))?;

        let settings = self.settings;
        let mut accepted: Vec<Rectangle> = Vec::new();
        let mut failure: Option<DetectError> = None;

        let mut visit = |page: RenderedPage| {
            if failure.is_some() {
                return;
            }
            let boxes = match model.detect(&page.image) {
                Ok(boxes) => boxes,
                Err(e) => {
                    failure = Some(e);
                    return;
                }
            };

            for scored in boxes.iter().filter(|b| b.score as f64 > threshold) {
                let Some(rect) = to_page_rectangle(
                    page.index,
                    scored,
                    settings.zoom,
                    page.width,
                    page.height,
                    settings.padding,
                ) else {
                    continue;
                };

                if is_duplicate(&rect, existing.iter().chain(accepted.iter()), settings.iou_threshold) {
                    log::debug!(
                        "[Detect] 第 {} 页: 跳过 ({:.1}, {:.1}) 处的重复结果",
                        page.index,
                        rect.x(),
                        rect.y()
                    );
                    continue;
                }

                log::info!(
                    "[Detect] 第 {} 页: 签名位于 ({:.1}, {:.1}, {:.1}x{:.1}) 得分 {:.2}",
                    page.index,
                    rect.x(),
                    rect.y(),
                    rect.width(),
                    rect.height(),
                    scored.score
                );
                accepted.push(rect);
            }
        };

        self.renderer.render_pages(pdf, settings.zoom, &mut visit)?;
        if let Some(e) = failure {
            return Err(e);
        }

        log::info!("[Detect] 新增 {} 个签名", accepted.len());
        Ok(accepted)
    }
}
