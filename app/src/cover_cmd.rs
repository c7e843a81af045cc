use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use redactor_detect::SignatureDetector;
use redactor_pdf::cover_signatures;
use serde::Serialize;

use crate::shared::{default_output, read_existing, read_pdf, require_available};

pub const OUTPUT_SUFFIX: &str = "_signatures_redacted.pdf";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverSummary {
    pub output: PathBuf,
    pub signatures_detected: usize,
    pub signatures_redacted: usize,
    pub method: &'static str,
}

/// 覆盖给定的签名以及 `detector` 找到的签名。
/// 没有检测器时只覆盖 `existing`。
pub fn run(
    detector: Option<&SignatureDetector>,
    input: &Path,
    existing: Option<&Path>,
    confidence: f64,
    output: Option<&Path>,
) -> anyhow::Result<CoverSummary> {
    let bytes = read_pdf(input)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, OUTPUT_SUFFIX));
    let existing = read_existing(existing);

    let (detected, method) = match detector {
        Some(detector) => {
            require_available(detector)?;
            (detector.detect(&bytes, &existing, confidence), "yolo")
        }
        None => (Vec::new(), "none"),
    };
    tracing::info!("在 {} 中发现 {} 个新签名", input.display(), detected.len());

    let detected_count = detected.len();
    let mut all = existing;
    all.extend(detected);

    let covered = if all.is_empty() {
        tracing::info!("{} 中没有签名，直接复制输入", input.display());
        bytes
    } else {
        tracing::info!("覆盖 {} 个签名", all.len());
        cover_signatures(&bytes, &all)
            .with_context(|| format!("covering signatures failed for {}", input.display()))?
    };

    fs::write(&output, covered)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!("已写出 {}", output.display());

    Ok(CoverSummary {
        output,
        signatures_detected: detected_count,
        signatures_redacted: all.len(),
        method,
    })
}
