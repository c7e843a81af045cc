//! Core types for region redaction: rectangles, coordinate transforms and
//! overlap deduplication.

pub mod dedup;
pub mod geometry;
pub mod rectangle;
pub mod transform;

pub use dedup::{iou, is_duplicate, DEFAULT_IOU_THRESHOLD};
pub use geometry::{Rect, Size};
pub use rectangle::{group_by_page, parse_rectangles, Rectangle};
pub use transform::{internal_to_user_space, to_displayed, to_internal, Rotation};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid rectangle field `{field}`: {reason}")]
    InvalidRectangle {
        field: &'static str,
        reason: String,
    },
    #[error("rectangles must be a JSON array of coordinate objects")]
    NotAnArray,
    #[error("invalid rectangle JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidRectangle {
            field,
            reason: reason.into(),
        }
    }
}
