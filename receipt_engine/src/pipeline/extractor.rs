//! Text extraction around the external OCR collaborator: per-attempt timeout, bounded retries
//! with exponential backoff, and low-confidence flagging of the recognized lines.

use std::time::Duration;

use log::*;
use thiserror::Error;

use crate::{
    config::VerifyConfig,
    pipeline::normalizer::NormalizedImage,
    traits::{OcrEngine, OcrError},
    types::ExtractedText,
};

#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// The recognizer stayed unreachable through every attempt. The engine maps this to a
    /// `needs_review` verdict — a submission is never silently dropped.
    #[error("Text recognition failed after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },
    /// The recognizer refused the input outright.
    #[error("The recognizer rejected the image: {0}")]
    Rejected(String),
}

pub struct TextExtractor<O> {
    ocr: O,
    timeout: Duration,
    retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    confidence_floor: f32,
}

impl<O> TextExtractor<O>
where O: OcrEngine
{
    pub fn new(ocr: O, config: &VerifyConfig) -> Self {
        Self {
            ocr,
            timeout: config.ocr_timeout,
            retries: config.ocr_retries,
            base_delay_ms: config.ocr_base_delay_ms,
            max_delay_ms: config.ocr_max_delay_ms,
            confidence_floor: config.confidence_floor,
        }
    }

    /// Runs recognition on the normalized image. Transient failures and timeouts are retried
    /// with exponential backoff plus jitter; permanent refusals are not.
    pub async fn extract(&self, image: &NormalizedImage) -> Result<ExtractedText, ExtractionError> {
        let max_attempts = self.retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match tokio::time::timeout(self.timeout, self.ocr.recognize(&image.bytes)).await {
                Ok(Ok(text)) => {
                    trace!("🧾 Recognition succeeded on attempt {attempt}: {} lines", text.lines.len());
                    return Ok(self.flag_low_confidence(text));
                },
                Ok(Err(OcrError::Permanent(e))) => {
                    warn!("🧾 Recognizer rejected the image: {e}");
                    return Err(ExtractionError::Rejected(e));
                },
                Ok(Err(OcrError::Transient(e))) => {
                    warn!("🧾 Recognition attempt {attempt}/{max_attempts} failed: {e}");
                    last_error = e;
                },
                Err(_) => {
                    warn!("🧾 Recognition attempt {attempt}/{max_attempts} timed out after {:?}", self.timeout);
                    last_error = format!("timed out after {:?}", self.timeout);
                },
            }
            if attempt < max_attempts {
                let delay = self.retry_delay(attempt);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
        Err(ExtractionError::Unavailable { attempts: max_attempts, last_error })
    }

    /// Exponential backoff with jitter so racing submissions do not hammer a recovering
    /// recognizer in lockstep.
    fn retry_delay(&self, attempt: u32) -> u64 {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
        let delay = exponential.min(self.max_delay_ms);
        let jitter = rand::random::<u64>() % (delay / 4 + 1);
        delay + jitter
    }

    fn flag_low_confidence(&self, text: ExtractedText) -> ExtractedText {
        let floor = self.confidence_floor;
        let lines = text
            .lines
            .into_iter()
            .filter(|l| !l.text.trim().is_empty())
            .map(|mut l| {
                l.low_confidence = l.confidence < floor;
                l
            })
            .collect();
        ExtractedText::new(lines)
    }
}
