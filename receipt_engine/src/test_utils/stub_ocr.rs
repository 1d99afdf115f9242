//! A deterministic OCR collaborator for tests: scripted lines, scripted failures.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crate::{
    traits::{OcrEngine, OcrError},
    types::{ExtractedText, TextLine},
};

/// Returns the scripted (text, confidence) lines, optionally failing a number of times first.
/// Clones share the failure counter, so a clone handed to the extractor can still be
/// inspected from the test.
#[derive(Clone)]
pub struct ScriptedOcr {
    lines: Vec<TextLine>,
    transient_failures: Arc<AtomicU32>,
    rejection: Option<String>,
    calls: Arc<AtomicU32>,
}

impl ScriptedOcr {
    pub fn new(script: &[(&str, f32)]) -> Self {
        Self {
            lines: script.iter().map(|(text, confidence)| TextLine::new(*text, *confidence)).collect(),
            transient_failures: Arc::new(AtomicU32::new(0)),
            rejection: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fails the first `n` recognition attempts with a transient error, then succeeds.
    pub fn failing_first(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Never recovers.
    pub fn always_failing() -> Self {
        Self::new(&[]).failing_first(u32::MAX)
    }

    /// Refuses every attempt with a permanent error.
    pub fn rejecting(message: &str) -> Self {
        let mut stub = Self::new(&[]);
        stub.rejection = Some(message.to_string());
        stub
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for ScriptedOcr {
    async fn recognize(&self, _image: &[u8]) -> Result<ExtractedText, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.rejection {
            return Err(OcrError::Permanent(message.clone()));
        }
        if self.transient_failures.load(Ordering::SeqCst) > 0 {
            self.transient_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(OcrError::Transient("scripted outage".to_string()));
        }
        Ok(ExtractedText::new(self.lines.clone()))
    }
}
