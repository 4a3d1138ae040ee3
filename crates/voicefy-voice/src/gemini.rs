//! Gemini `generateContent` client for speech and text.
//!
//! Speech: `responseModalities: ["AUDIO"]` with a prebuilt voice; audio comes back as base64 PCM in
//! `candidates[0].content.parts[*].inlineData`. Text: concatenated text parts of the first candidate.

use crate::error::{VoiceError, VoiceResult};
use crate::tts::{
    refine_prompt, translate_prompt, InlineAudio, RemoteError, SpeechGenerator, SpeechRequest,
    TextAssistant,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use voicefy_core::{Language, StudioConfig};

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> + '_ {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    fn inline_audio(&self) -> Option<InlineAudio> {
        self.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| !d.data.is_empty())
            .map(|d| InlineAudio {
                data: d.data.clone(),
                mime_type: d.mime_type.clone(),
            })
    }

    fn text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Gemini API client. Cheap to clone; the HTTP pool is shared.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    /// Base URL without trailing slash (e.g. https://generativelanguage.googleapis.com/v1beta).
    pub base_url: String,
    api_key: String,
    /// Turbo speech model.
    pub speech_model: String,
    /// High-quality speech model.
    pub speech_model_hq: String,
    /// Refinement / translation model.
    pub text_model: String,
    http: reqwest::Client,
}

impl GeminiClient {
    /// Build from config with an explicit credential.
    pub fn new(config: &StudioConfig, api_key: impl Into<String>) -> VoiceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| VoiceError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            speech_model: config.speech_model.clone(),
            speech_model_hq: config.speech_model_hq.clone(),
            text_model: config.text_model.clone(),
            http,
        })
    }

    /// Build from config, requiring a usable credential.
    pub fn from_config(config: &StudioConfig) -> VoiceResult<Self> {
        let key = config
            .credential()
            .ok_or_else(|| VoiceError::Configuration("API_KEY_MISSING".to_string()))?;
        Self::new(config, key)
    }

    pub fn speech_model_for(&self, high_quality: bool) -> &str {
        if high_quality {
            &self.speech_model_hq
        } else {
            &self.speech_model
        }
    }

    async fn generate_content(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> Result<GenerateContentResponse, RemoteError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(model = %model, "generateContent request");
        let res = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::new(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RemoteError::new(Some(status.as_u16()), body));
        }
        res.json::<GenerateContentResponse>()
            .await
            .map_err(RemoteError::transport)
    }
}

#[async_trait]
impl SpeechGenerator for GeminiClient {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Option<InlineAudio>, RemoteError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt() }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": request.voice }
                    }
                }
            }
        });
        let model = self.speech_model_for(request.high_quality).to_string();
        let response = self.generate_content(&model, body).await?;
        Ok(response.inline_audio())
    }
}

#[async_trait]
impl TextAssistant for GeminiClient {
    async fn refine(&self, text: &str, style: &str) -> Result<String, RemoteError> {
        let body = json!({ "contents": [{ "parts": [{ "text": refine_prompt(text, style) }] }] });
        let model = self.text_model.clone();
        Ok(self.generate_content(&model, body).await?.text())
    }

    async fn translate(&self, text: &str, language: Language) -> Result<String, RemoteError> {
        let body = json!({ "contents": [{ "parts": [{ "text": translate_prompt(text, language) }] }] });
        let model = self.text_model.clone();
        Ok(self.generate_content(&model, body).await?.text())
    }
}
