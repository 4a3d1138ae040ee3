//! **VoiceStudio** — the request/cache orchestrator.
//!
//! ```text
//! request ──► validate ──► history probe ──hit──► promote ──► play
//!                              │
//!                             miss ──► persona ──► remote ──► decode ──► history ──► play
//! ```
//!
//! The studio is the only writer of history. Methods take `&mut self`, so one caller drives it
//! at a time; the rodio output is not `Send` on every platform, so run it on a current-thread
//! runtime or a `LocalSet`.

use crate::analyser::{AnalyserConfig, AnalysisTap};
use crate::audio::SampleBuffer;
use crate::client::ClientHandle;
use crate::compressed::CompressedEncoder;
use crate::download::{DownloadArtifact, DownloadFormat, CURRENT_PREFIX, HISTORY_PREFIX};
use crate::error::{VoiceError, VoiceResult};
use crate::history::{GenerationRequest, History, HistoryEntry};
use crate::playback::{OutputDevice, PlaybackEngine, PlaybackState};
use crate::tts::SpeechRequest;
use crate::wav::{encode_wav, WAV_MIME};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voicefy_core::{Language, Library, LibraryRecord, PersonaCatalog, StudioConfig};

/// Outcome of [`VoiceStudio::generate`].
#[derive(Debug, Clone)]
pub struct Generation {
    /// History entry now at the front.
    pub entry_id: Uuid,
    pub buffer: Arc<SampleBuffer>,
    /// True when the audio came from history without a network call.
    pub cache_hit: bool,
}

pub struct VoiceStudio {
    personas: Arc<PersonaCatalog>,
    client: ClientHandle,
    history: History,
    engine: PlaybackEngine,
    encoder: CompressedEncoder,
    /// Whatever was played last (generated, replayed, or recalled).
    current: Option<Arc<SampleBuffer>>,
}

impl VoiceStudio {
    pub fn new(
        config: &StudioConfig,
        personas: Arc<PersonaCatalog>,
        client: ClientHandle,
        output: Box<dyn OutputDevice>,
    ) -> VoiceResult<Self> {
        let tap = Arc::new(AnalysisTap::new(AnalyserConfig::with_fft_size(config.fft_size))?);
        Ok(Self {
            personas,
            client,
            history: History::with_capacity(config.history_capacity),
            engine: PlaybackEngine::new(output, tap),
            encoder: CompressedEncoder::with_default_backends(),
            current: None,
        })
    }

    /// Replace the compressed export backends.
    pub fn with_encoder(mut self, encoder: CompressedEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Generate (or reuse) audio for `request` and start playing it.
    pub async fn generate(&mut self, request: GenerationRequest) -> VoiceResult<Generation> {
        if request.text.trim().is_empty() {
            return Err(VoiceError::EmptyInput);
        }
        if !self.client.has_credential() {
            return Err(VoiceError::Configuration("API_KEY_MISSING".to_string()));
        }

        if let Some(index) = self.history.find_match(&request) {
            if let Some(entry) = self.history.promote(index) {
                if let Some(buffer) = entry.buffer.clone() {
                    let entry_id = entry.id;
                    info!(entry = %entry_id, speed = request.speed, "♻️ cache hit, replaying from history");
                    self.play(Arc::clone(&buffer), request.speed)?;
                    return Ok(Generation {
                        entry_id,
                        buffer,
                        cache_hit: true,
                    });
                }
            }
        }

        let backend = self.client.get()?;
        let persona = self.personas.resolve(&request.persona);
        let speech = SpeechRequest {
            text: request.text.clone(),
            voice: persona.voice.clone(),
            style: persona.style.clone(),
            language: request.language,
            speed: request.speed,
            high_quality: request.high_quality,
        };
        info!(
            persona = %request.persona,
            voice = %speech.voice,
            language = %request.language,
            high_quality = request.high_quality,
            "🎙️ generating speech"
        );

        let audio = match backend.synthesize(&speech).await {
            Ok(Some(audio)) => audio,
            Ok(None) => {
                return Err(VoiceError::Generation(
                    "No audio generated by the speech service.".to_string(),
                ))
            }
            Err(remote) => {
                let err = VoiceError::from(remote);
                warn!(error = %err, "speech generation failed");
                return Err(err);
            }
        };
        let buffer = Arc::new(audio.decode()?);
        debug!(
            frames = buffer.frames(),
            sample_rate = buffer.sample_rate(),
            "speech decoded"
        );

        let entry = HistoryEntry::new(request.clone(), Some(Arc::clone(&buffer)));
        let entry_id = entry.id;
        if let Some(evicted) = self.history.push_front(entry) {
            debug!(entry = %evicted.id, "history full, evicted oldest entry");
        }
        self.play(Arc::clone(&buffer), request.speed)?;

        Ok(Generation {
            entry_id,
            buffer,
            cache_hit: false,
        })
    }

    /// Move a history entry to the front and play it at its own speed.
    /// Returns the entry's request so a front end can restore its inputs; `None` for unknown ids.
    pub fn replay(&mut self, id: Uuid) -> VoiceResult<Option<GenerationRequest>> {
        let Some(entry) = self.history.promote_id(id) else {
            return Ok(None);
        };
        let request = entry.request.clone();
        match entry.buffer.clone() {
            Some(buffer) => self.play(buffer, request.speed)?,
            None => debug!(entry = %id, "history entry has no audio in memory"),
        }
        Ok(Some(request))
    }

    fn play(&mut self, buffer: Arc<SampleBuffer>, speed: f32) -> VoiceResult<()> {
        self.current = Some(Arc::clone(&buffer));
        self.engine.play(buffer, speed)?;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// Live speed change; ignored while idle.
    pub fn set_speed(&mut self, speed: f32) -> bool {
        self.engine.set_speed(speed)
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.engine.state()
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    /// The output device has rendered everything it was given.
    pub fn output_drained(&self) -> bool {
        self.engine.output_drained()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.engine.subscribe()
    }

    pub fn analysis_tap(&self) -> Arc<AnalysisTap> {
        self.engine.tap()
    }

    /// Rewrite `text` in the persona's style. Blank text comes back untouched without a call.
    pub async fn refine_text(&mut self, text: &str, persona: &str) -> VoiceResult<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let backend = self.client.get()?;
        let style = self.personas.refine_style(persona).to_string();
        let reply = backend.refine(text, &style).await.map_err(|e| {
            let err = VoiceError::from(e);
            warn!(error = %err, "text refinement failed");
            err
        })?;
        Ok(keep_original_if_empty(reply, text))
    }

    /// Translate `text`. Blank text comes back untouched without a call.
    pub async fn translate_text(&mut self, text: &str, language: Language) -> VoiceResult<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let backend = self.client.get()?;
        let reply = backend.translate(text, language).await.map_err(|e| {
            let err = VoiceError::from(e);
            warn!(error = %err, "translation failed");
            err
        })?;
        Ok(keep_original_if_empty(reply, text))
    }

    /// Text to show after switching to `language`: the built-in sample when the editor is blank or
    /// still holds a sample, otherwise a translation.
    pub async fn switch_language(
        &mut self,
        current_text: &str,
        language: Language,
    ) -> VoiceResult<String> {
        if current_text.trim().is_empty() || Language::is_sample_text(current_text) {
            return Ok(language.sample_text().to_string());
        }
        self.translate_text(current_text, language).await
    }

    /// Swap the credential; the next remote call reconnects.
    pub fn reinitialize_client(&mut self, credential: Option<String>) {
        self.client.reinitialize(credential);
    }

    pub fn has_credential(&self) -> bool {
        self.client.has_credential()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn personas(&self) -> &PersonaCatalog {
        &self.personas
    }

    /// Buffer played most recently.
    pub fn current_buffer(&self) -> Option<Arc<SampleBuffer>> {
        self.current.clone()
    }

    /// Encode the current clip (`entry = None`, named `Vocalize_<ms>`) or a history entry
    /// (named `Voicefy_<id>`).
    pub async fn prepare_download(
        &self,
        entry: Option<Uuid>,
        format: DownloadFormat,
    ) -> VoiceResult<DownloadArtifact> {
        let (buffer, prefix, stem) = match entry {
            None => (
                self.current.clone(),
                CURRENT_PREFIX,
                chrono::Utc::now().timestamp_millis().to_string(),
            ),
            Some(id) => (
                self.history.get(id).and_then(|e| e.buffer.clone()),
                HISTORY_PREFIX,
                id.to_string(),
            ),
        };
        let buffer = buffer.ok_or_else(|| VoiceError::Encoding("no audio to download".to_string()))?;
        DownloadArtifact::prepare(buffer, format, prefix, &stem, &self.encoder).await
    }

    /// Persist a history entry as WAV. `None` when the entry is unknown or has no audio.
    pub fn save_to_library(&self, id: Uuid, library: &Library) -> VoiceResult<Option<LibraryRecord>> {
        let Some(entry) = self.history.get(id) else {
            return Ok(None);
        };
        let Some(buffer) = entry.buffer.as_ref() else {
            return Ok(None);
        };
        let record = LibraryRecord {
            id: entry.id.to_string(),
            text: entry.request.text.clone(),
            language: entry.request.language,
            voice: entry.request.persona.clone(),
            speed: entry.request.speed,
            timestamp: entry.created_at.timestamp_millis(),
            mime_type: WAV_MIME.to_string(),
        };
        library.save(&record, &encode_wav(buffer))?;
        Ok(Some(record))
    }

    /// Load a library clip and play it at its saved speed. History is not touched.
    pub fn recall_from_library(
        &mut self,
        id: &str,
        library: &Library,
    ) -> VoiceResult<Option<LibraryRecord>> {
        let Some(item) = library.load(id)? else {
            return Ok(None);
        };
        let buffer = Arc::new(SampleBuffer::from_wav_bytes(&item.audio)?);
        self.play(buffer, item.record.speed)?;
        Ok(Some(item.record))
    }
}

fn keep_original_if_empty(reply: String, original: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        original.to_string()
    } else {
        trimmed.to_string()
    }
}
