use smol_str::SmolStr;

use crate::error::ScribeError;
use crate::service::LanguageDetector;
use crate::store::{MessageCode, SurfaceMessage};
use crate::text::char_len;

/// Why a language was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LanguageStatus {
    /// The detector's best guess met the confidence threshold.
    Confident,
    /// Too little text to detect; fallback used silently.
    TooShort,
    Unavailable,
    LowConfidence,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LanguageResolution {
    pub language: SmolStr,
    pub status: LanguageStatus,
    pub confidence: Option<f32>,
}

impl LanguageResolution {
    /// Advisory to show for this resolution, if any.
    pub fn advisory(&self) -> Option<SurfaceMessage> {
        let (code, text) = match self.status {
            LanguageStatus::Confident | LanguageStatus::TooShort => return None,
            LanguageStatus::Unavailable => (
                MessageCode::LanguageDetectionUnavailable,
                format!("Language detection is unavailable; checking as {}.", self.language),
            ),
            LanguageStatus::LowConfidence => (
                MessageCode::LanguageLowConfidence,
                format!("Could not determine the language confidently; checking as {}.", self.language),
            ),
            LanguageStatus::Failed => (
                MessageCode::LanguageDetectionFailed,
                format!("Language detection failed; checking as {}.", self.language),
            ),
        };
        Some(SurfaceMessage::new(code, text))
    }
}

/// Picks the language to proofread in.
#[derive(Clone, Debug)]
pub struct LanguageResolver {
    min_chars: usize,
    threshold: f32,
    fallback: SmolStr,
}

impl LanguageResolver {
    pub fn new(min_chars: usize, threshold: f32, fallback: impl Into<SmolStr>) -> Self {
        Self {
            min_chars,
            threshold,
            fallback: fallback.into(),
        }
    }

    pub fn fallback(&self) -> &SmolStr {
        &self.fallback
    }

    pub async fn resolve<D: LanguageDetector>(&self, detector: &D, text: &str) -> LanguageResolution {
        if char_len(text.trim()) < self.min_chars {
            return self.fallback_with(LanguageStatus::TooShort, None);
        }
        let candidates = match detector.detect(text).await {
            Ok(candidates) => candidates,
            Err(ScribeError::DetectorUnavailable) => {
                return self.fallback_with(LanguageStatus::Unavailable, None);
            }
            Err(e) => {
                tracing::warn!(target: "scribe::language", error = %e, "language detection failed");
                return self.fallback_with(LanguageStatus::Failed, None);
            }
        };

        let best = candidates
            .into_iter()
            .filter(|c| !c.language.is_empty() && c.confidence.is_finite())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
        match best {
            Some(c) if c.confidence >= self.threshold => LanguageResolution {
                language: c.language,
                status: LanguageStatus::Confident,
                confidence: Some(c.confidence),
            },
            Some(c) => {
                tracing::debug!(
                    target: "scribe::language",
                    candidate = %c.language,
                    confidence = c.confidence,
                    "below confidence threshold"
                );
                self.fallback_with(LanguageStatus::LowConfidence, Some(c.confidence))
            }
            None => self.fallback_with(LanguageStatus::LowConfidence, None),
        }
    }

    fn fallback_with(&self, status: LanguageStatus, confidence: Option<f32>) -> LanguageResolution {
        LanguageResolution {
            language: self.fallback.clone(),
            status,
            confidence,
        }
    }
}
