use thiserror::Error;

use crate::types::ExtractedText;

/// The external text-recognition capability. The engine treats recognition as a black box that
/// returns lines with confidences, so tests can drive the pipeline with scripted output.
#[allow(async_fn_in_trait)]
pub trait OcrEngine {
    async fn recognize(&self, image: &[u8]) -> Result<ExtractedText, OcrError>;
}

#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// The recognizer could not be reached or timed out internally. Worth retrying.
    #[error("OCR engine is unavailable: {0}")]
    Transient(String),
    /// The recognizer rejected this input outright. Retrying cannot help.
    #[error("OCR engine rejected the image: {0}")]
    Permanent(String),
}
