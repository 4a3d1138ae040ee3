//! Downloadable artifacts: `<prefix>_<id-or-timestamp>.<ext>`.
//!
//! The compressed path is always named `.mp4`, even when negotiation fell back to `audio/mpeg`;
//! the artifact still carries the true mime type.

use crate::audio::SampleBuffer;
use crate::compressed::CompressedEncoder;
use crate::error::VoiceResult;
use crate::wav::{encode_wav, WAV_MIME};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Prefix for the clip currently loaded in the studio.
pub const CURRENT_PREFIX: &str = "Vocalize";
/// Prefix for clips exported from history or the library.
pub const HISTORY_PREFIX: &str = "Voicefy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadFormat {
    #[default]
    Wav,
    Mp4,
}

impl DownloadFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DownloadFormat::Wav => "wav",
            DownloadFormat::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DownloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(DownloadFormat::Wav),
            "mp4" | "m4a" | "mp3" | "compressed" => Ok(DownloadFormat::Mp4),
            other => Err(format!("unknown download format: {}", other)),
        }
    }
}

/// `<prefix>_<stem>.<ext>`
pub fn file_name(prefix: &str, stem: &str, format: DownloadFormat) -> String {
    format!("{}_{}.{}", prefix, stem, format.extension())
}

/// Encoded bytes plus the name and container they should be saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DownloadArtifact {
    /// Encode `buffer` and name it `<prefix>_<stem>.<ext>`.
    pub async fn prepare(
        buffer: Arc<SampleBuffer>,
        format: DownloadFormat,
        prefix: &str,
        stem: &str,
        encoder: &CompressedEncoder,
    ) -> VoiceResult<Self> {
        let (mime_type, bytes) = match format {
            DownloadFormat::Wav => (WAV_MIME.to_string(), encode_wav(&buffer)),
            DownloadFormat::Mp4 => {
                let blob = encoder.encode(buffer).await?;
                (blob.mime_type, blob.bytes)
            }
        };
        Ok(Self {
            file_name: file_name(prefix, stem, format),
            mime_type,
            bytes,
        })
    }

    /// Write into `dir` (created if missing). Returns the full path.
    pub fn save_to(&self, dir: &Path) -> VoiceResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        info!(path = %path.display(), mime = %self.mime_type, bytes = self.bytes.len(), "📥 download written");
        Ok(path)
    }
}
