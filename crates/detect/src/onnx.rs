//! 运行在 ONNX Runtime 上的 YOLOS 签名模型

use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::DetectError;
use crate::model::{decode_detections, ScoredBox, SignatureModel};
use crate::preprocess::prepare_input;
use crate::threading::ThreadSettings;

/// 模型目录中的默认模型文件名
pub const MODEL_FILE: &str = "yolos-small-signature.onnx";

/// 导出的检测 Transformer：单个 `pixel_values` 输入，
/// 按顺序输出 `logits`、`pred_boxes`
pub struct OnnxSignatureModel {
    session: Mutex<Session>,
}

impl OnnxSignatureModel {
    pub fn new(model_path: &Path) -> Result<Self, DetectError> {
        if !model_path.exists() {
            return Err(DetectError::ModelLoad(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        log::info!("[Model] 加载模型: {}", model_path.display());

        let builder = Session::builder()
            .map_err(|e: ort::Error| DetectError::ModelLoad(e.to_string()))?;
        let builder = ThreadSettings::from_env()
            .apply(builder)
            .map_err(|e| DetectError::ModelLoad(e.to_string()))?;
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| DetectError::ModelLoad(format!("{}: {}", model_path.display(), e)))?;

        log::info!("[Model] 模型加载完成");
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// 从 `model_dir` 加载 `MODEL_FILE`
    pub fn from_dir(model_dir: &Path) -> Result<Self, DetectError> {
        Self::new(&model_dir.join(MODEL_FILE))
    }
}

impl SignatureModel for OnnxSignatureModel {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<ScoredBox>, DetectError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectError::ImageProcess("empty page image".to_string()));
        }
        let input = prepare_input(image);
        let input_tensor =
            Tensor::from_array(input).map_err(|e| DetectError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectError::Inference("model session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let logits = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectError::Inference(e.to_string()))?
            .to_owned();
        let boxes = outputs[1]
            .try_extract_array::<f32>()
            .map_err(|e| DetectError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);
        drop(session);

        decode_detections(&logits.view(), &boxes.view(), image.width(), image.height())
    }
}
