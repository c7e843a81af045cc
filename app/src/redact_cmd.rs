use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use redactor_pdf::{redact_bytes, RedactOptions};
use serde::Serialize;

use crate::config::AppConfig;
use crate::shared::{default_output, read_pdf, read_rectangles};

pub const OUTPUT_SUFFIX: &str = "_redacted.pdf";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactSummary {
    pub success: bool,
    pub output: PathBuf,
    pub redactions_requested: usize,
    pub pages_redacted: usize,
    pub regions_applied: usize,
    pub skipped_oversized: usize,
    pub skipped_out_of_range: usize,
    pub text_runs_removed: usize,
    pub images_redacted: usize,
    pub forms_rewritten: usize,
}

pub fn run(
    config: &AppConfig,
    input: &Path,
    redactions: &Path,
    output: Option<&Path>,
) -> anyhow::Result<RedactSummary> {
    // 先校验矩形，再读取文档
    let rectangles = read_rectangles(redactions)?;
    let bytes = read_pdf(input)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, OUTPUT_SUFFIX));

    tracing::info!(
        "脱敏 {} 个区域: {}",
        rectangles.len(),
        input.display()
    );

    let options = RedactOptions {
        max_region_fraction: config.max_region_fraction,
    };
    let (redacted, report) = redact_bytes(&bytes, &rectangles, &options)
        .with_context(|| format!("redaction failed for {}", input.display()))?;

    fs::write(&output, redacted)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!("已写出 {}", output.display());

    Ok(RedactSummary {
        success: true,
        output,
        redactions_requested: rectangles.len(),
        pages_redacted: report.pages_redacted,
        regions_applied: report.regions_applied,
        skipped_oversized: report.skipped_oversized,
        skipped_out_of_range: report.skipped_out_of_range,
        text_runs_removed: report.text_runs_removed,
        images_redacted: report.images_redacted,
        forms_rewritten: report.forms_rewritten,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_support::sample_pdf;

    fn write_inputs(dir: &Path, rects: &str) -> (PathBuf, PathBuf) {
        let pdf = dir.join("letter.pdf");
        fs::write(&pdf, sample_pdf("Hello World")).unwrap();
        let json = dir.join("rects.json");
        fs::write(&json, rects).unwrap();
        (pdf, json)
    }

    #[test]
    fn test_redacts_to_default_output() {
        let dir = tempfile::tempdir().unwrap();
        let (pdf, json) = write_inputs(
            dir.path(),
            r#"[{"pageIndex": 0, "x": 95, "y": 80, "width": 120, "height": 20, "category": "Person"}]"#,
        );

        let summary = run(&AppConfig::default(), &pdf, &json, None).unwrap();
        assert!(summary.success);
        assert_eq!(summary.output, dir.path().join("letter_redacted.pdf"));
        assert_eq!(summary.regions_applied, 1);
        assert_eq!(summary.text_runs_removed, 1);

        let out = lopdf::Document::load(&summary.output).unwrap();
        assert_eq!(out.get_pages().len(), 1);
    }

    #[test]
    fn test_empty_list_copies_input() {
        let dir = tempfile::tempdir().unwrap();
        let (pdf, json) = write_inputs(dir.path(), "[]");
        let target = dir.path().join("copy.pdf");

        let summary = run(&AppConfig::default(), &pdf, &json, Some(&target)).unwrap();
        assert_eq!(summary.regions_applied, 0);
        assert_eq!(fs::read(&target).unwrap(), fs::read(&pdf).unwrap());
    }

    #[test]
    fn test_malformed_rectangles_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (pdf, json) = write_inputs(
            dir.path(),
            r#"[{"pageIndex": 0, "x": 1, "y": 1, "width": -4, "height": 1}]"#,
        );

        assert!(run(&AppConfig::default(), &pdf, &json, None).is_err());
        assert!(!dir.path().join("letter_redacted.pdf").exists());
    }

    #[test]
    fn test_oversized_limit_comes_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let (pdf, json) = write_inputs(
            dir.path(),
            r#"[{"pageIndex": 0, "x": 0, "y": 0, "width": 400, "height": 100}]"#,
        );

        let summary = run(&AppConfig::default(), &pdf, &json, None).unwrap();
        assert_eq!(summary.skipped_oversized, 1);

        let relaxed = AppConfig {
            max_region_fraction: 0.9,
            ..AppConfig::default()
        };
        let summary = run(&relaxed, &pdf, &json, None).unwrap();
        assert_eq!(summary.skipped_oversized, 0);
        assert_eq!(summary.regions_applied, 1);
    }
}
