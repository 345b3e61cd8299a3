//! Maps heterogeneous generation failures to user-facing messages.
//!
//! Errors from the generation backend arrive either as a JSON error envelope
//! (`{"error":{"code":429,"status":"RESOURCE_EXHAUSTED",...}}`) or as plain
//! text. Both shapes are recognised for the same three conditions; anything
//! else is shown as-is.

use crate::i18n::I18n;
use crate::llm::LlmError;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    QuotaExceeded,
    InvalidCredential,
    NotConfigured,
    Other,
}

impl ErrorKind {
    pub fn message_key(self) -> Option<&'static str> {
        match self {
            ErrorKind::QuotaExceeded => Some("error-quota-exceeded"),
            ErrorKind::InvalidCredential => Some("error-invalid-key"),
            ErrorKind::NotConfigured => Some("error-not-configured"),
            ErrorKind::Other => None,
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<u16>,
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        let status = self.status.as_deref().unwrap_or_default();
        let message = self.message.as_deref().unwrap_or_default();
        let invalid_key_reason = self
            .details
            .iter()
            .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"));

        if self.code == Some(429) || status == "RESOURCE_EXHAUSTED" {
            ErrorKind::QuotaExceeded
        } else if invalid_key_reason
            || matches!(self.code, Some(401 | 403))
            || (matches!(status, "INVALID_ARGUMENT" | "UNAUTHENTICATED" | "PERMISSION_DENIED")
                && mentions_api_key(message))
        {
            ErrorKind::InvalidCredential
        } else {
            kind_from_text(message)
        }
    }
}

fn mentions_api_key(message: &str) -> bool {
    message.to_ascii_lowercase().contains("api key")
}

fn kind_from_text(message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();
    if message.contains("429") || message.contains("RESOURCE_EXHAUSTED") || lower.contains("quota") {
        ErrorKind::QuotaExceeded
    } else if lower.contains("api key not valid") || message.contains("API_KEY_INVALID") {
        ErrorKind::InvalidCredential
    } else if lower.contains("not configured") || lower.contains("api key missing") {
        ErrorKind::NotConfigured
    } else {
        ErrorKind::Other
    }
}

fn parse_envelope(message: &str) -> Option<ApiError> {
    serde_json::from_str::<ApiErrorEnvelope>(message.trim())
        .ok()
        .map(|e| e.error)
}

pub fn classify(message: &str) -> ErrorKind {
    match parse_envelope(message) {
        Some(api_error) => api_error.kind(),
        None => kind_from_text(message),
    }
}

/// User-facing text for an arbitrary error message.
///
/// Unrecognised structured errors show their inner `message`; unrecognised
/// plain text is returned unchanged.
pub fn user_message(message: &str, i18n: &I18n) -> String {
    let envelope = parse_envelope(message);
    let kind = envelope.as_ref().map_or_else(|| kind_from_text(message), ApiError::kind);
    if let Some(key) = kind.message_key() {
        return i18n.tr(key);
    }
    envelope
        .and_then(|e| e.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| message.to_string())
}

/// [`user_message`] applied to a backend error.
pub fn describe(error: &LlmError, i18n: &I18n) -> String {
    match error {
        LlmError::NotConfigured => i18n.tr("error-not-configured"),
        LlmError::NoOutput(_) | LlmError::Parse(_) => i18n.tr("error-generation-failed"),
        other => user_message(&other.raw_message(), i18n),
    }
}
