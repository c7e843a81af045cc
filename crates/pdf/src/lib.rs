//! PDF region redaction and signature covering on top of lopdf.
//!
//! Two engines share the page geometry in [`page`]:
//!
//! - [`redact`] removes text and image pixels inside regions, then paints
//!   them white;
//! - [`cover`] only paints white rectangles over regions.
//!
//! Both take rectangles in displayed (rotation-applied, top-left origin)
//! coordinates and write a compacted document.

mod content;
mod error;
mod font;
mod inline;
mod ops;
mod overlay;
pub mod page;
mod pixels;
mod samples;
mod save;
mod text;
mod walk;

pub mod cover;
pub mod redact;

#[cfg(test)]
mod testing;

pub use cover::{cover, cover_signatures, CoverReport};
pub use error::{PdfError, Result};
pub use page::{page_ids, PageGeometry};
pub use redact::{
    redact, redact_bytes, redact_file, RedactOptions, RedactionReport, DEFAULT_MAX_REGION_FRACTION,
};
pub use save::save_compacted;

/// Number of pages in a PDF held in memory.
pub fn page_count(bytes: &[u8]) -> Result<usize> {
    Ok(save::load(bytes)?.get_pages().len())
}
