use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use redactor_detect::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_ZOOM};
use redactor_pdf::DEFAULT_MAX_REGION_FRACTION;

/// 未指定 `--config` 时在工作目录中查找
pub const DEFAULT_CONFIG_FILE: &str = "redactor.json";

pub const ENV_MODEL_PATH: &str = "REDACTOR_MODEL_PATH";
pub const ENV_PDFIUM_PATH: &str = "REDACTOR_PDFIUM_PATH";
pub const ENV_ZOOM: &str = "REDACTOR_ZOOM";
pub const ENV_CONFIDENCE: &str = "REDACTOR_CONFIDENCE";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// 签名检测器的 ONNX 导出文件
    pub model_path: PathBuf,
    /// pdfium 动态库；不指定时使用搜索路径和系统库
    pub pdfium_path: Option<PathBuf>,
    /// 检测时的渲染倍率
    pub zoom: f32,
    /// 默认检测阈值
    pub confidence: f64,
    pub iou_threshold: f64,
    /// 单个脱敏区域最多可占页面的比例
    pub max_region_fraction: f64,
    /// 启动时加载模型，缺失则直接失败
    pub fail_fast: bool,
    pub log: LogConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    pub level: String,
    /// 输出 JSON 行而不是纯文本
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolos-small-signature.onnx"),
            pdfium_path: None,
            zoom: DEFAULT_ZOOM,
            confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: redactor_core::DEFAULT_IOU_THRESHOLD,
            max_region_fraction: DEFAULT_MAX_REGION_FRACTION,
            fail_fast: false,
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl AppConfig {
    /// 读取 `explicit`，否则读取存在的 `redactor.json`，再否则使用默认值。
    /// 显式指定但无法读取的路径视为错误。
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json { path, source })
    }

    /// 应用 `REDACTOR_*` 环境变量覆盖。返回值无法解析而被忽略的变量名。
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();

        if let Some(path) = lookup(ENV_MODEL_PATH).filter(|v| !v.is_empty()) {
            self.model_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_PDFIUM_PATH).filter(|v| !v.is_empty()) {
            self.pdfium_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_ZOOM) {
            match raw.trim().parse::<f32>() {
                Ok(zoom) if zoom > 0.0 && zoom.is_finite() => self.zoom = zoom,
                _ => ignored.push(ENV_ZOOM),
            }
        }
        if let Some(raw) = lookup(ENV_CONFIDENCE) {
            match raw.trim().parse::<f64>() {
                Ok(c) if (0.0..=1.0).contains(&c) => self.confidence = c,
                _ => ignored.push(ENV_CONFIDENCE),
            }
        }

        ignored
    }
}
