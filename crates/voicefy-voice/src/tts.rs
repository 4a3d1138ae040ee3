//! Remote collaborators: speech generation and text assistance.
//!
//! Implement [`SpeechGenerator`] / [`TextAssistant`] for a real API (see `gemini`) or a test double.

use crate::audio::{decode_base64_pcm, PcmFormat, SampleBuffer};
use crate::error::VoiceResult;
use async_trait::async_trait;
use std::fmt;
use voicefy_core::Language;

/// Everything the speech collaborator needs for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    /// Prebuilt voice name resolved from the persona.
    pub voice: String,
    /// Delivery instructions resolved from the persona.
    pub style: String,
    pub language: Language,
    /// Playback rate the clip will be played at. Applied locally, not sent.
    pub speed: f32,
    pub high_quality: bool,
}

impl SpeechRequest {
    /// Prompt embedding the literal text, style and language.
    pub fn prompt(&self) -> String {
        format!(
            "Say the following text: \"{}\"\n\nStyle instructions: {}\nLanguage: {}",
            self.text, self.style, self.language
        )
    }
}

/// Inline audio as returned by the speech API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAudio {
    /// Base64 16-bit little-endian PCM.
    pub data: String,
    pub mime_type: Option<String>,
}

impl InlineAudio {
    /// Format declared by the mime type, or 24 kHz mono.
    pub fn format(&self) -> PcmFormat {
        self.mime_type
            .as_deref()
            .map(PcmFormat::from_mime)
            .unwrap_or_default()
    }

    pub fn decode(&self) -> VoiceResult<SampleBuffer> {
        decode_base64_pcm(&self.data, self.format())
    }
}

/// Raw failure from a collaborator, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Error body or transport message, verbatim.
    pub body: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn transport(err: impl fmt::Display) -> Self {
        Self::new(None, err.to_string())
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "remote error {}: {}", status, self.body),
            None => write!(f, "remote error: {}", self.body),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Text-to-speech collaborator.
#[async_trait]
pub trait SpeechGenerator: Send + Sync {
    /// `Ok(None)` means the call succeeded but carried no audio.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Option<InlineAudio>, RemoteError>;
}

/// Text refinement and translation collaborator. Empty replies mean "keep the original".
#[async_trait]
pub trait TextAssistant: Send + Sync {
    /// Rewrite `text` to match the style descriptor.
    async fn refine(&self, text: &str, style: &str) -> Result<String, RemoteError>;

    /// Translate `text` into `language`.
    async fn translate(&self, text: &str, language: Language) -> Result<String, RemoteError>;
}

/// A collaborator that does both.
pub trait StudioBackend: SpeechGenerator + TextAssistant {}

impl<T: SpeechGenerator + TextAssistant> StudioBackend for T {}

pub fn refine_prompt(text: &str, style: &str) -> String {
    format!(
        "Rewrite the following text to match this style description: \"{}\". Keep the meaning the same but enhance the tone. Text: \"{}\"",
        style, text
    )
}

pub fn translate_prompt(text: &str, language: Language) -> String {
    format!(
        "Translate the following text to {}. Return only the translated text. Text: \"{}\"",
        language, text
    )
}
