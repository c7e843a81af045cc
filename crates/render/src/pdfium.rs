//! 基于 pdfium 的 [`PageRenderer`]

use std::path::{Path, PathBuf};

use pdfium_render::prelude::*;

use crate::{PageRenderer, RenderError, RenderedPage};

/// 按顺序搜索 pdfium 动态库的目录
fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("libs"));
            paths.push(exe_dir.to_path_buf());
        }
    }

    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

fn bind(explicit: Option<&Path>) -> Result<Pdfium, RenderError> {
    // 显式路径可以直接指向库文件
    if let Some(path) = explicit.filter(|p| p.is_file()) {
        log::debug!("[Render] 从 {:?} 绑定 pdfium", path);
        return Pdfium::bind_to_library(path)
            .map(Pdfium::new)
            .map_err(|e| RenderError::Bind(format!("{}: {}", path.display(), e)));
    }

    for dir in search_paths(explicit) {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&dir);
        log::debug!("[Render] 尝试 {:?} 处的 pdfium", lib_path);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::info!("[Render] 已从 {:?} 加载 pdfium", dir);
            return Ok(Pdfium::new(bindings));
        }
    }

    log::debug!("[Render] 尝试系统 pdfium");
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| RenderError::Bind(e.to_string()))
}

/// pdfium 用 `u16` 表示页码
fn page_number(index: usize) -> Result<u16, RenderError> {
    u16::try_from(index).map_err(|_| RenderError::Page {
        index,
        reason: "页码超出 pdfium 的 u16 范围".to_string(),
    })
}

/// 用 pdfium 光栅化页面
pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// 给定 `library_path`（文件或目录）时从该处绑定 pdfium，
    /// 否则依次尝试常见位置，最后使用系统库
    pub fn new(library_path: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Self {
            pdfium: bind(library_path)?,
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_pages(
        &self,
        pdf: &[u8],
        zoom: f32,
        visitor: &mut dyn FnMut(RenderedPage),
    ) -> Result<(), RenderError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| RenderError::Load(e.to_string()))?;

        let page_count = document.pages().len() as usize;
        for index in 0..page_count {
            let page = document
                .pages()
                .get(page_number(index)?)
                .map_err(|e| RenderError::Page {
                    index,
                    reason: e.to_string(),
                })?;

            let width = page.width().value;
            let height = page.height().value;
            let target_width = (width * zoom).round().max(1.0) as i32;
            let target_height = (height * zoom).round().max(1.0) as i32;

            let config = PdfRenderConfig::new()
                .set_target_width(target_width)
                .set_target_height(target_height);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| RenderError::Render {
                    index,
                    reason: e.to_string(),
                })?;

            log::debug!(
                "[Render] 第 {} 页: {:.1}x{:.1} pt -> {}x{} px",
                index,
                width,
                height,
                target_width,
                target_height
            );

            visitor(RenderedPage {
                index,
                image: bitmap.as_image(),
                width: width as f64,
                height: height as f64,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_is_searched_first() {
        let paths = search_paths(Some(Path::new("/opt/pdfium")));
        assert_eq!(paths[0], PathBuf::from("/opt/pdfium"));
        assert!(paths.contains(&PathBuf::from("libs")));
    }

    #[test]
    fn test_page_number_rejects_out_of_range_index() {
        assert_eq!(page_number(7).unwrap(), 7);
        assert_eq!(page_number(65_535).unwrap(), u16::MAX);
        match page_number(65_536) {
            Err(RenderError::Page { index, .. }) => assert_eq!(index, 65_536),
            other => panic!("expected page error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_default_search_paths() {
        let paths = search_paths(None);
        assert_eq!(paths.last(), Some(&PathBuf::from("./")));
    }
}
