//! # Voicefy Voice - Speech Generation and Playback
//!
//! Turns text into speech through a remote collaborator, caches recent clips, and plays them
//! back with live speed control while feeding a frequency analyser for the visualizer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          VoiceStudio                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │ ClientHandle │→ │ PCM Decoder  │→ │ MRU History  │            │
//! │  │   (Gemini)   │  │ (base64/L16) │  │  (10 clips)  │            │
//! │  └──────────────┘  └──────────────┘  └──────────────┘            │
//! │                                             ↓                    │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Visualizer  │← │ AnalysisTap  │← │ Playback Eng │            │
//! │  │   (bars)     │  │  (rustfft)   │  │   (rodio)    │            │
//! │  └──────────────┘  └──────────────┘  └──────────────┘            │
//! │                                                                  │
//! │  Export: WAV (RIFF/PCM16) · compressed (LAME)                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod analyser;
pub mod audio;
pub mod client;
pub mod compressed;
pub mod download;
pub mod error;
pub mod gemini;
pub mod headless;
pub mod history;
pub mod playback;
pub mod studio;
pub mod tts;
pub mod visualizer;
pub mod wav;

pub use analyser::{AnalyserConfig, AnalysisTap};
pub use audio::{decode_base64_pcm, decode_pcm16, PcmFormat, SampleBuffer};
pub use client::{ClientHandle, Connector};
pub use compressed::{CompressedEncoder, ContainerEncoder, EncodedBlob};
#[cfg(feature = "mp3")]
pub use compressed::Mp3Encoder;
pub use download::{DownloadArtifact, DownloadFormat};
pub use error::{Notice, VoiceError, VoiceResult};
pub use gemini::GeminiClient;
pub use headless::{HeadlessOutput, HeadlessProbe, Pace, SessionSnapshot};
pub use history::{GenerationRequest, History, HistoryEntry};
pub use playback::{
    clamp_speed, OutputDevice, PlaybackEngine, PlaybackSink, PlaybackState, RodioOutput,
    TappedSource,
};
pub use studio::{Generation, VoiceStudio};
pub use tts::{
    InlineAudio, RemoteError, SpeechGenerator, SpeechRequest, StudioBackend, TextAssistant,
};
pub use visualizer::{bar_layout, Bar, Surface, Visualizer};
pub use wav::encode_wav;
