//! Text-recognition providers and the recognizer that fans a unit out to them.

pub mod bridge;
pub mod process;
pub mod recognizer;
pub mod tesseract;

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::core::config::{ProviderKind, ProviderSpec};
use crate::core::model::{FailureKind, ProviderReading, ProviderRole};

pub use bridge::CommandProvider;
pub use recognizer::{Recognition, Recognizer};
pub use tesseract::TesseractProvider;

/// What kind of region a provider is asked to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionHint {
    Page,
    /// Last-resort deterministic re-read after every provider came back empty.
    Fallback,
    SingleLine,
}

impl RecognitionHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionHint::Page => "page",
            RecognitionHint::Fallback => "fallback",
            RecognitionHint::SingleLine => "line",
        }
    }
}

/// Errors from recognition providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not available: {0}")]
    Unavailable(String),

    #[error("recognition failed: {0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unreadable provider output: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Unavailable(_) => FailureKind::Unavailable,
            ProviderError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Failed,
        }
    }
}

/// One independent text-recognition engine.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> ProviderRole;

    /// Whether the engine can run at all (binary installed, script present).
    fn is_available(&self) -> bool;

    fn availability_hint(&self) -> String {
        format!("{} is not available", self.name())
    }

    /// Upper bound on one call; the recognizer stops waiting after this.
    fn timeout(&self) -> Duration;

    fn recognize(
        &self,
        image: &DynamicImage,
        hint: RecognitionHint,
    ) -> Result<ProviderReading, ProviderError>;
}

pub fn build_provider(spec: &ProviderSpec) -> Arc<dyn Provider> {
    match spec.kind {
        ProviderKind::Tesseract => Arc::new(TesseractProvider::new(spec)),
        ProviderKind::Command => Arc::new(CommandProvider::new(spec)),
    }
}

pub fn build_providers(specs: &[ProviderSpec]) -> Vec<Arc<dyn Provider>> {
    specs.iter().map(build_provider).collect()
}

/// NFKC-normalize provider text so ligatures and full-width forms compare equal.
pub fn normalize_text(text: &str) -> String {
    text.nfkc().collect()
}

pub fn normalize_reading(mut reading: ProviderReading) -> ProviderReading {
    reading.text = normalize_text(&reading.text);
    if let Some(lines) = reading.lines.as_mut() {
        for line in lines.iter_mut() {
            line.text = normalize_text(&line.text);
        }
    }
    reading
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::OcrLine;

    #[test]
    fn normalization_folds_ligatures() {
        assert_eq!(normalize_text("ﬁght ＴＯ 4２"), "fight TO 42");
    }

    #[test]
    fn normalizes_lines_too() {
        let reading = ProviderReading {
            provider: "p".to_string(),
            role: ProviderRole::Neural,
            text: "ﬂee".to_string(),
            lines: Some(vec![OcrLine::plain("ﬂee")]),
            elapsed_ms: 3,
        };
        let reading = normalize_reading(reading);
        assert_eq!(reading.text, "flee");
        assert_eq!(reading.lines.unwrap()[0].text, "flee");
    }

    #[test]
    fn timeouts_and_unavailability_map_to_failure_kinds() {
        assert_eq!(ProviderError::Timeout(Duration::from_secs(1)).kind(), FailureKind::Timeout);
        assert_eq!(ProviderError::Unavailable("x".into()).kind(), FailureKind::Unavailable);
        assert_eq!(ProviderError::Parse("x".into()).kind(), FailureKind::Failed);
    }
}
