//! Signature detection on rendered PDF pages.
//!
//! Pages are rasterised through a [`redactor_render::PageRenderer`], run
//! through a [`SignatureModel`] (YOLOS on ONNX Runtime in production) and
//! mapped back to page-space [`redactor_core::Rectangle`]s.

mod detector;
mod error;
mod model;
mod onnx;
mod postprocess;
mod preprocess;
mod slot;
mod threading;

pub use detector::{
    DetectorSettings, SignatureDetector, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_ZOOM,
};
pub use error::DetectError;
pub use model::{decode_detections, ScoredBox, SignatureModel};
pub use onnx::{OnnxSignatureModel, MODEL_FILE};
pub use postprocess::{signature_label, to_page_rectangle, PADDING_FRACTION, SIGNATURE_CATEGORY};
pub use preprocess::{prepare_input, resize_dims};
pub use slot::{BoxedModel, InitPolicy, ModelLoader, ModelSlot};
pub use threading::{ThreadSettings, INTER_THREADS_ENV, THREADS_ENV};
