//! Error types for the Voicefy audio pipeline, and the mapping from remote failures to them.

use crate::tts::RemoteError;
use std::fmt;
use thiserror::Error;
use voicefy_core::CoreError;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while generating, decoding, playing or exporting audio
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    #[error("No compressed encoder available (tried {0})")]
    EncodingUnavailable(String),

    #[error("Please enter some text.")]
    EmptyInput,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Storage error: {0}")]
    Storage(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rodio::StreamError> for VoiceError {
    fn from(err: rodio::StreamError) -> Self {
        VoiceError::Playback(err.to_string())
    }
}

impl From<rodio::PlayError> for VoiceError {
    fn from(err: rodio::PlayError) -> Self {
        VoiceError::Playback(err.to_string())
    }
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        VoiceError::MalformedAudio(err.to_string())
    }
}

impl From<base64::DecodeError> for VoiceError {
    fn from(err: base64::DecodeError) -> Self {
        VoiceError::MalformedAudio(format!("invalid base64 payload: {}", err))
    }
}

impl From<RemoteError> for VoiceError {
    fn from(err: RemoteError) -> Self {
        VoiceError::from_remote(&err)
    }
}

const QUOTA_MARKERS: &[&str] = &[
    "resource_exhausted",
    "quota",
    "rate limit",
    "rate-limit",
    "too many requests",
];
const QUOTA_CODES: &[&str] = &["429"];

const AUTH_MARKERS: &[&str] = &[
    "api_key_invalid",
    "api key not valid",
    "api key",
    "permission_denied",
    "unauthenticated",
    "unauthorized",
    "forbidden",
];
const AUTH_CODES: &[&str] = &["401", "403"];

impl VoiceError {
    /// Classify a failure reported by the remote collaborator.
    ///
    /// The body may be a structured error object or a string with JSON embedded in it;
    /// the innermost `error.message` (plus `error.status`) is matched when present.
    /// Quota indicators win over credential indicators; anything else is a generic failure.
    pub fn from_remote(err: &RemoteError) -> Self {
        let message = extract_message(&err.body);
        let haystack = message.to_lowercase();

        let status_is = |codes: &[&str]| {
            err.status
                .map(|s| codes.iter().any(|c| *c == s.to_string()))
                .unwrap_or(false)
        };

        if status_is(QUOTA_CODES)
            || QUOTA_MARKERS.iter().any(|m| haystack.contains(m))
            || QUOTA_CODES.iter().any(|c| contains_code(&haystack, c))
        {
            return VoiceError::QuotaExceeded(message);
        }
        if status_is(AUTH_CODES)
            || AUTH_MARKERS.iter().any(|m| haystack.contains(m))
            || AUTH_CODES.iter().any(|c| contains_code(&haystack, c))
        {
            return VoiceError::Authorization(message);
        }
        VoiceError::Generation(message)
    }

    /// The notice a front end shows for this error.
    pub fn notice(&self) -> Notice {
        match self {
            VoiceError::Configuration(_) => Notice::SetupRequired,
            VoiceError::QuotaExceeded(_) => Notice::UnlockCapacity,
            VoiceError::Authorization(_) => Notice::CredentialRejected,
            VoiceError::EmptyInput => Notice::EmptyInput,
            VoiceError::EncodingUnavailable(_) | VoiceError::Encoding(_) => {
                Notice::DownloadUnavailable
            }
            VoiceError::MalformedAudio(_)
            | VoiceError::Generation(_)
            | VoiceError::Playback(_)
            | VoiceError::Storage(_)
            | VoiceError::Io(_) => Notice::Failure(self.to_string()),
        }
    }
}

/// User-visible notice, one per error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Blocking: no credential configured.
    SetupRequired,
    /// The remote reported exhausted capacity.
    UnlockCapacity,
    /// The credential was refused.
    CredentialRejected,
    EmptyInput,
    DownloadUnavailable,
    Failure(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SetupRequired => f.write_str(
                "Missing API Key. Set GEMINI_API_KEY (or API_KEY) and try again.",
            ),
            Notice::UnlockCapacity => f.write_str(
                "Generation quota exhausted. Connect a key with more capacity to unlock higher limits.",
            ),
            Notice::CredentialRejected => {
                f.write_str("The API key was rejected. Check the key and its permissions.")
            }
            Notice::EmptyInput => f.write_str("Please enter some text."),
            Notice::DownloadUnavailable => f.write_str("Failed to create download file."),
            Notice::Failure(msg) => f.write_str(msg),
        }
    }
}

/// Pull the human message out of a remote error body, unwrapping one level of embedded JSON.
fn extract_message(raw: &str) -> String {
    if let Some(found) = message_from_json(raw) {
        return found;
    }
    // "got status 429: {...}" style bodies
    if let Some(start) = raw.find('{') {
        if let Some(found) = message_from_json(&raw[start..]) {
            return found;
        }
    }
    raw.trim().to_string()
}

fn message_from_json(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    match &value {
        serde_json::Value::String(inner) => message_from_json(inner).or_else(|| Some(inner.clone())),
        serde_json::Value::Object(_) => {
            let error = value.get("error").unwrap_or(&value);
            let message = error.get("message").and_then(|m| m.as_str());
            let status = error.get("status").and_then(|s| s.as_str());
            match (message, status) {
                (Some(m), Some(s)) if !m.contains(s) => Some(format!("{} ({})", m, s)),
                (Some(m), _) => message_from_json(m).or_else(|| Some(m.to_string())),
                (None, Some(s)) => Some(s.to_string()),
                (None, None) => None,
            }
        }
        _ => None,
    }
}

/// True if `code` appears in `text` as a standalone number.
fn contains_code(text: &str, code: &str) -> bool {
    text.match_indices(code).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + code.len()..].chars().next();
        !before.map_or(false, |c| c.is_ascii_digit()) && !after.map_or(false, |c| c.is_ascii_digit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: Option<u16>, body: &str) -> RemoteError {
        RemoteError {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn structured_quota_body() {
        let body = r#"{"error":{"code":429,"message":"You exceeded your current quota.","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = VoiceError::from_remote(&remote(None, body));
        assert!(matches!(err, VoiceError::QuotaExceeded(ref m) if m.starts_with("You exceeded")));
        assert_eq!(err.notice(), Notice::UnlockCapacity);
    }

    #[test]
    fn embedded_json_in_string() {
        let inner = r#"{"error":{"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let body = serde_json::to_string(inner).unwrap();
        let err = VoiceError::from_remote(&remote(None, &body));
        assert!(matches!(err, VoiceError::Authorization(_)));
        assert_eq!(err.notice(), Notice::CredentialRejected);
    }

    #[test]
    fn prefixed_json_body() {
        let body = r#"got status: 403 {"error":{"message":"Permission denied on resource","status":"PERMISSION_DENIED"}}"#;
        assert!(matches!(
            VoiceError::from_remote(&remote(None, body)),
            VoiceError::Authorization(_)
        ));
    }

    #[test]
    fn plain_strings_and_status_codes() {
        assert!(matches!(
            VoiceError::from_remote(&remote(None, "Rate limit reached, slow down")),
            VoiceError::QuotaExceeded(_)
        ));
        assert!(matches!(
            VoiceError::from_remote(&remote(Some(401), "nope")),
            VoiceError::Authorization(_)
        ));
        assert!(matches!(
            VoiceError::from_remote(&remote(Some(500), "internal error")),
            VoiceError::Generation(_)
        ));
        // 4290 is not a 429
        assert!(matches!(
            VoiceError::from_remote(&remote(None, "frame 4290 failed")),
            VoiceError::Generation(_)
        ));
    }

    #[test]
    fn quota_wins_over_auth() {
        let body = "403 quota exceeded for this API key";
        assert!(matches!(
            VoiceError::from_remote(&remote(None, body)),
            VoiceError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn every_error_has_a_notice() {
        assert_eq!(
            VoiceError::Configuration("x".into()).notice(),
            Notice::SetupRequired
        );
        assert_eq!(VoiceError::EmptyInput.notice(), Notice::EmptyInput);
        assert_eq!(
            VoiceError::EncodingUnavailable("audio/mp4".into()).notice(),
            Notice::DownloadUnavailable
        );
        assert!(matches!(
            VoiceError::MalformedAudio("odd".into()).notice(),
            Notice::Failure(_)
        ));
    }
}
