use std::path::Path;

use redactor_core::Rectangle;
use redactor_detect::SignatureDetector;
use serde::Serialize;

use crate::shared::{read_existing, read_pdf, require_available};

pub const METHOD: &str = "yolo";

#[derive(Debug, Serialize)]
pub struct DetectSummary {
    pub success: bool,
    pub signatures: Vec<Rectangle>,
    pub count: usize,
    pub method: &'static str,
}

pub fn run(
    detector: &SignatureDetector,
    input: &Path,
    existing: Option<&Path>,
    confidence: f64,
) -> anyhow::Result<DetectSummary> {
    let bytes = read_pdf(input)?;
    require_available(detector)?;
    let existing = read_existing(existing);

    tracing::info!(
        "检测 {} 中的签名（置信度 > {}）",
        input.display(),
        confidence
    );
    let signatures = detector.detect(&bytes, &existing, confidence);
    tracing::info!("发现 {} 个签名", signatures.len());

    Ok(DetectSummary {
        success: true,
        count: signatures.len(),
        signatures,
        method: METHOD,
    })
}
