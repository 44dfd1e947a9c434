//! Contracts for the external proofreading and language-detection services.
//!
//! Both are black boxes: the core only shapes requests, interprets responses,
//! and never inspects linguistic content.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::correction::Correction;
use crate::error::ScribeError;

/// Request sent to a proofreader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofreadRequest {
    pub request_id: u64,
    pub text: String,
    pub language: SmolStr,
    pub fallback_language: SmolStr,
}

/// Successful proofreading payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofreadResult {
    pub corrected_text: String,
    pub corrections: Vec<Correction>,
}

/// Service error codes. Anything unrecognised deserialises as `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    UnsupportedLanguage,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage => "unsupported-language",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload reported by a proofreader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            name: None,
        }
    }
}

impl From<ServiceError> for ScribeError {
    fn from(e: ServiceError) -> Self {
        ScribeError::Service {
            code: e.code,
            message: e.message,
        }
    }
}

/// Response as it arrives over local message passing.
///
/// `ok: true` carries `result`, `ok: false` carries `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofreadResponse {
    pub request_id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProofreadResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
}

impl ProofreadResponse {
    pub fn success(request_id: u64, result: ProofreadResult) -> Self {
        Self {
            request_id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(request_id: u64, error: ServiceError) -> Self {
        Self {
            request_id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }

    /// Collapse the wire shape into a result. Malformed responses count as
    /// unknown service failures.
    pub fn into_outcome(self) -> Result<ProofreadResult, ServiceError> {
        match (self.ok, self.result, self.error) {
            (true, Some(result), _) => Ok(result),
            (false, _, Some(error)) => Err(error),
            (true, None, _) => Err(ServiceError::new(
                ErrorCode::Unknown,
                "response marked ok without a result",
            )),
            (false, _, None) => Err(ServiceError::new(
                ErrorCode::Unknown,
                "response marked failed without an error",
            )),
        }
    }
}

/// A proofreading engine bound to one language.
#[allow(async_fn_in_trait)]
pub trait Proofreader {
    async fn proofread(&self, request: &ProofreadRequest) -> ProofreadResponse;
}

/// Creates proofreaders per language; the pool caches what this returns.
pub trait ProofreaderFactory {
    type Proofreader: Proofreader;

    /// Fails with `ScribeError::Service { code: UnsupportedLanguage, .. }` when
    /// the engine has no model for `language`.
    fn create(&self, language: &str) -> Result<Self::Proofreader, ScribeError>;
}

/// One language guess from a detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LanguageCandidate {
    pub language: SmolStr,
    pub confidence: f32,
}

/// Language detection collaborator.
#[allow(async_fn_in_trait)]
pub trait LanguageDetector {
    /// Candidates in any order. `ScribeError::DetectorUnavailable` signals that
    /// detection is not offered at all.
    async fn detect(&self, text: &str) -> Result<Vec<LanguageCandidate>, ScribeError>;
}

/// Detector for hosts without language detection.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDetector;

impl LanguageDetector for NoDetector {
    async fn detect(&self, _text: &str) -> Result<Vec<LanguageCandidate>, ScribeError> {
        Err(ScribeError::DetectorUnavailable)
    }
}
