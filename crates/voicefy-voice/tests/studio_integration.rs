//! Integration tests for the studio pipeline
//!
//! Everything except the last test runs against a scripted backend and the headless output,
//! so no network or sound card is needed.

use async_trait::async_trait;
use base64::Engine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voicefy_core::{Language, Library, PersonaCatalog, StudioConfig};
use voicefy_voice::{
    ClientHandle, GenerationRequest, HeadlessOutput, HeadlessProbe, InlineAudio, Notice, Pace,
    PlaybackState, RemoteError, RodioOutput, SpeechGenerator, SpeechRequest, TextAssistant,
    VoiceError, VoiceStudio,
};

/// Answers every speech request with a short tone whose length encodes the call number.
struct ToneBackend {
    calls: AtomicUsize,
}

impl ToneBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechGenerator for ToneBackend {
    async fn synthesize(&self, _: &SpeechRequest) -> Result<Option<InlineAudio>, RemoteError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let frames = 480 * n;
        let pcm: Vec<u8> = (0..frames)
            .map(|i| ((i as f32 * 0.07).sin() * 8000.0) as i16)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        Ok(Some(InlineAudio {
            data: base64::engine::general_purpose::STANDARD.encode(pcm),
            mime_type: Some("audio/L16;codec=pcm;rate=24000".into()),
        }))
    }
}

#[async_trait]
impl TextAssistant for ToneBackend {
    async fn refine(&self, text: &str, _: &str) -> Result<String, RemoteError> {
        Ok(text.to_uppercase())
    }

    async fn translate(&self, text: &str, _: Language) -> Result<String, RemoteError> {
        Ok(text.to_string())
    }
}

/// Fails every call with a fixed remote error.
struct FailingBackend(RemoteError);

#[async_trait]
impl SpeechGenerator for FailingBackend {
    async fn synthesize(&self, _: &SpeechRequest) -> Result<Option<InlineAudio>, RemoteError> {
        Err(self.0.clone())
    }
}

#[async_trait]
impl TextAssistant for FailingBackend {
    async fn refine(&self, _: &str, _: &str) -> Result<String, RemoteError> {
        Err(self.0.clone())
    }

    async fn translate(&self, _: &str, _: Language) -> Result<String, RemoteError> {
        Err(self.0.clone())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn headless_studio(
    backend: Arc<dyn voicefy_voice::StudioBackend>,
    pace: Pace,
) -> (VoiceStudio, HeadlessProbe) {
    init_tracing();
    let output = HeadlessOutput::new(pace);
    let probe = output.probe();
    let studio = VoiceStudio::new(
        &StudioConfig::default(),
        Arc::new(PersonaCatalog::builtin().expect("builtin catalog")),
        ClientHandle::fixed(Some("test-key".into()), backend),
        Box::new(output),
    )
    .expect("Failed to create studio");
    (studio, probe)
}

#[tokio::test]
async fn test_cache_is_idempotent() {
    let backend = ToneBackend::new();
    let (mut studio, probe) = headless_studio(backend.clone(), Pace::Held);

    let request = GenerationRequest::new("The quick brown fox").persona("Base_Kore");
    let first = studio.generate(request.clone()).await.expect("first generation");
    let second = studio.generate(request).await.expect("second generation");

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(backend.calls(), 1, "second request must not reach the network");
    assert_eq!(probe.sessions_opened(), 2, "both requests should play");
    assert_eq!(studio.history().len(), 1);
}

#[tokio::test]
async fn test_history_is_bounded_newest_first() {
    let backend = ToneBackend::new();
    let (mut studio, _probe) = headless_studio(backend.clone(), Pace::Held);

    for i in 0..15 {
        studio
            .generate(GenerationRequest::new(format!("clip {}", i)))
            .await
            .expect("generation");
    }

    let texts: Vec<String> = studio
        .history()
        .iter()
        .map(|e| e.request.text.clone())
        .collect();
    assert_eq!(texts.len(), 10);
    assert_eq!(texts[0], "clip 14");
    assert_eq!(texts[9], "clip 5");

    // evicted entries are gone from the cache too
    studio
        .generate(GenerationRequest::new("clip 0"))
        .await
        .expect("regeneration");
    assert_eq!(backend.calls(), 16);
}

#[tokio::test]
async fn test_replay_promotes_entry() {
    let backend = ToneBackend::new();
    let (mut studio, probe) = headless_studio(backend.clone(), Pace::Held);

    let mut ids = Vec::new();
    for text in ["one", "two", "three"] {
        let generated = studio
            .generate(GenerationRequest::new(text).speed(0.75))
            .await
            .expect("generation");
        ids.push(generated.entry_id);
    }

    let request = studio
        .replay(ids[0])
        .expect("replay")
        .expect("entry present");
    assert_eq!(request.text, "one");
    assert_eq!(studio.history().iter().next().map(|e| e.id), Some(ids[0]));
    assert_eq!(studio.history().len(), 3);
    assert!((probe.last().expect("session").speed - 0.75).abs() < 1e-6);
    assert_eq!(backend.calls(), 3);

    assert!(studio.replay(uuid::Uuid::new_v4()).expect("replay").is_none());
}

#[tokio::test]
async fn test_transport_is_exclusive() {
    let backend = ToneBackend::new();
    let (mut studio, probe) = headless_studio(backend, Pace::Held);

    studio.generate(GenerationRequest::new("first")).await.expect("first");
    studio.generate(GenerationRequest::new("second")).await.expect("second");

    assert_eq!(probe.sessions_opened(), 2);
    assert_eq!(probe.connected_sessions(), 1);
    assert!(!probe.session(0).expect("first session").connected);

    assert!(studio.set_speed(1.8));
    assert!((probe.last().expect("session").speed - 1.8).abs() < 1e-6);

    studio.stop();
    studio.stop();
    assert_eq!(probe.connected_sessions(), 0);
    assert_eq!(studio.playback_state(), PlaybackState::Idle);
    assert!(!studio.set_speed(1.2), "speed changes are ignored while idle");
}

#[tokio::test]
async fn test_playback_ends_naturally() {
    let backend = ToneBackend::new();
    let (mut studio, probe) = headless_studio(backend, Pace::Unthrottled);
    let mut state = studio.subscribe_playback();

    studio.generate(GenerationRequest::new("short")).await.expect("generation");

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == PlaybackState::Idle),
    )
    .await
    .expect("playback should finish")
    .expect("engine alive");
    assert!(probe.last().expect("session").completed);
    assert!(studio.analysis_tap().byte_frequency_data().iter().any(|&b| b > 0));
}

#[tokio::test]
async fn test_errors_are_classified() {
    let cases = [
        (
            RemoteError::new(Some(429), r#"{"error":{"message":"Resource has been exhausted (e.g. check quota)."}}"#),
            Notice::UnlockCapacity,
        ),
        (
            RemoteError::new(Some(400), r#"{"error":{"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#),
            Notice::CredentialRejected,
        ),
        (
            RemoteError::new(Some(500), "Internal error encountered."),
            Notice::Failure("Generation failed: Internal error encountered.".to_string()),
        ),
    ];

    for (remote, expected) in cases {
        let (mut studio, probe) = headless_studio(Arc::new(FailingBackend(remote)), Pace::Held);
        let err = studio
            .generate(GenerationRequest::new("Hello"))
            .await
            .expect_err("remote failure");
        assert_eq!(err.notice(), expected, "unexpected notice for {:?}", err);
        assert!(studio.history().is_empty());
        assert_eq!(probe.sessions_opened(), 0);
    }
}

#[tokio::test]
async fn test_reinitialize_without_credential_requires_setup() {
    let backend = ToneBackend::new();
    let (mut studio, _probe) = headless_studio(backend.clone(), Pace::Held);

    studio.reinitialize_client(None);
    let err = studio
        .generate(GenerationRequest::new("Hello"))
        .await
        .expect_err("no credential");
    assert!(matches!(err, VoiceError::Configuration(_)));
    assert_eq!(err.notice(), Notice::SetupRequired);
    assert_eq!(backend.calls(), 0);

    studio.reinitialize_client(Some("fresh-key".into()));
    studio.generate(GenerationRequest::new("Hello")).await.expect("generation");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_library_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let library = Library::open_path(dir.path().join("voicefy_library")).expect("library");
    let backend = ToneBackend::new();
    let (mut studio, probe) = headless_studio(backend, Pace::Held);

    let generated = studio
        .generate(GenerationRequest::new("Keep me").language(Language::Tamil).speed(1.25))
        .await
        .expect("generation");
    studio
        .save_to_library(generated.entry_id, &library)
        .expect("save")
        .expect("entry present");

    let listed = library.list().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].language, Language::Tamil);

    studio.stop();
    studio
        .recall_from_library(&listed[0].id, &library)
        .expect("recall")
        .expect("record present");
    assert!(studio.is_playing());
    assert!((probe.last().expect("session").speed - 1.25).abs() < 1e-6);

    let recalled = studio.current_buffer().expect("current buffer");
    assert_eq!(recalled.frames(), generated.buffer.frames());
    for (a, b) in recalled.channels()[0].iter().zip(generated.buffer.channels()[0].iter()) {
        assert!((a - b).abs() <= 2.0 / 32768.0);
    }
}

#[test]
#[ignore] // Requires an audio output device
fn test_rodio_output_plays_tone() {
    init_tracing();
    let output = RodioOutput::new().expect("Failed to open default output device");
    let tap = Arc::new(
        voicefy_voice::AnalysisTap::new(voicefy_voice::AnalyserConfig::default()).expect("tap"),
    );
    let mut engine = voicefy_voice::PlaybackEngine::new(Box::new(output), tap);

    let samples = (0..24_000)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 24_000.0).sin() * 0.2)
        .collect();
    let tone = Arc::new(voicefy_voice::SampleBuffer::mono(24_000, samples).expect("buffer"));
    engine.play(tone, 1.0).expect("play");
    assert!(engine.is_playing());

    std::thread::sleep(Duration::from_millis(300));
    engine.set_speed(1.5);
    std::thread::sleep(Duration::from_millis(300));
    engine.stop();
    assert!(!engine.is_playing());
}
