//! Compressed export with container negotiation.
//!
//! Backends implement [`ContainerEncoder`]. [`CompressedEncoder::negotiate`] walks the preference
//! list (`audio/mp4`, then `audio/mpeg`) and picks the first container a registered backend
//! supports, then any other supported backend. Encoding runs on a blocking worker and never
//! touches the playback engine.

use crate::audio::SampleBuffer;
use crate::error::{VoiceError, VoiceResult};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const MP4_MIME: &str = "audio/mp4";
pub const MPEG_MIME: &str = "audio/mpeg";

/// Preferred container first.
pub const CONTAINER_PREFERENCE: [&str; 2] = [MP4_MIME, MPEG_MIME];

/// One compressed container backend (e.g. LAME for MP3, an AAC muxer for MP4).
pub trait ContainerEncoder: Send + Sync {
    /// Mime type of the produced container.
    fn mime_type(&self) -> &str;

    /// Whether the backend can run on this machine.
    fn is_supported(&self) -> bool {
        true
    }

    /// Encode a mono or stereo buffer.
    fn encode(&self, buffer: &SampleBuffer) -> VoiceResult<Vec<u8>>;
}

/// Compressed bytes labelled with their true container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Negotiating front over the registered backends.
#[derive(Clone)]
pub struct CompressedEncoder {
    backends: Vec<Arc<dyn ContainerEncoder>>,
}

impl fmt::Debug for CompressedEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedEncoder")
            .field("backends", &self.supported_types())
            .finish()
    }
}

impl Default for CompressedEncoder {
    fn default() -> Self {
        Self::with_default_backends()
    }
}

impl CompressedEncoder {
    /// No backends; every encode fails with `EncodingUnavailable` until one is registered.
    pub fn empty() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Backends compiled into this build.
    pub fn with_default_backends() -> Self {
        #[allow(unused_mut)]
        let mut encoder = Self::empty();
        #[cfg(feature = "mp3")]
        {
            encoder = encoder.register(Arc::new(Mp3Encoder::default()));
        }
        encoder
    }

    pub fn register(mut self, backend: Arc<dyn ContainerEncoder>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Mime types of every backend that reports support.
    pub fn supported_types(&self) -> Vec<String> {
        self.backends
            .iter()
            .filter(|b| b.is_supported())
            .map(|b| b.mime_type().to_string())
            .collect()
    }

    /// Pick the backend to use.
    pub fn negotiate(&self) -> VoiceResult<Arc<dyn ContainerEncoder>> {
        let supported: Vec<&Arc<dyn ContainerEncoder>> =
            self.backends.iter().filter(|b| b.is_supported()).collect();

        for preferred in CONTAINER_PREFERENCE {
            if let Some(b) = supported
                .iter()
                .find(|b| b.mime_type().eq_ignore_ascii_case(preferred))
            {
                return Ok(Arc::clone(b));
            }
        }
        supported
            .first()
            .map(|b| Arc::clone(b))
            .ok_or_else(|| VoiceError::EncodingUnavailable(CONTAINER_PREFERENCE.join(", ")))
    }

    /// Encode `buffer` into the negotiated container.
    pub async fn encode(&self, buffer: Arc<SampleBuffer>) -> VoiceResult<EncodedBlob> {
        let backend = self.negotiate()?;
        let mime_type = backend.mime_type().to_string();
        debug!(mime = %mime_type, frames = buffer.frames(), "compressed encode starting");

        let bytes = tokio::task::spawn_blocking(move || {
            let input = downmix_for_compression(&buffer)?;
            backend.encode(&input)
        })
        .await
        .map_err(|e| VoiceError::Encoding(format!("encoder worker failed: {}", e)))??;

        if bytes.is_empty() {
            return Err(VoiceError::Encoding(format!("{} encoder produced no data", mime_type)));
        }
        info!(mime = %mime_type, bytes = bytes.len(), "🎵 compressed export ready");
        Ok(EncodedBlob { mime_type, bytes })
    }
}

/// Compressed containers get at most two channels; wider layouts are mixed to mono.
fn downmix_for_compression(buffer: &SampleBuffer) -> VoiceResult<Cow<'_, SampleBuffer>> {
    if buffer.channel_count() <= 2 {
        return Ok(Cow::Borrowed(buffer));
    }
    Ok(Cow::Owned(SampleBuffer::mono(buffer.sample_rate(), buffer.mixdown())?))
}

#[cfg(feature = "mp3")]
pub use mp3::Mp3Encoder;

#[cfg(feature = "mp3")]
mod mp3 {
    use super::{ContainerEncoder, MPEG_MIME};
    use crate::audio::SampleBuffer;
    use crate::error::{VoiceError, VoiceResult};
    use crate::wav::quantize;
    use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};

    /// MP3 via LAME, 128 kbps.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Mp3Encoder;

    fn lame_err<E: std::fmt::Debug>(stage: &str) -> impl FnOnce(E) -> VoiceError + '_ {
        move |e| VoiceError::Encoding(format!("LAME {}: {:?}", stage, e))
    }

    impl ContainerEncoder for Mp3Encoder {
        fn mime_type(&self) -> &str {
            MPEG_MIME
        }

        fn encode(&self, buffer: &SampleBuffer) -> VoiceResult<Vec<u8>> {
            let channels = buffer.channel_count();
            let mut builder = Builder::new()
                .ok_or_else(|| VoiceError::Encoding("LAME could not allocate an encoder".into()))?;
            builder.set_num_channels(channels as u8).map_err(lame_err("channels"))?;
            builder
                .set_sample_rate(buffer.sample_rate())
                .map_err(lame_err("sample rate"))?;
            builder.set_brate(Bitrate::Kbps128).map_err(lame_err("bitrate"))?;
            builder.set_quality(Quality::Best).map_err(lame_err("quality"))?;
            let mut encoder = builder.build().map_err(lame_err("init"))?;

            let pcm: Vec<i16> = buffer.interleaved().into_iter().map(quantize).collect();
            let frames = buffer.frames();
            let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(frames) + 7200);
            if channels == 1 {
                encoder
                    .encode_to_vec(MonoPcm(pcm.as_slice()), &mut out)
                    .map_err(lame_err("encode"))?;
            } else {
                encoder
                    .encode_to_vec(InterleavedPcm(pcm.as_slice()), &mut out)
                    .map_err(lame_err("encode"))?;
            }
            encoder
                .flush_to_vec::<FlushNoGap>(&mut out)
                .map_err(lame_err("flush"))?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        mime: &'static str,
        supported: bool,
        output: Vec<u8>,
    }

    impl ContainerEncoder for Fixed {
        fn mime_type(&self) -> &str {
            self.mime
        }
        fn is_supported(&self) -> bool {
            self.supported
        }
        fn encode(&self, buffer: &SampleBuffer) -> VoiceResult<Vec<u8>> {
            assert!(buffer.channel_count() <= 2);
            Ok(self.output.clone())
        }
    }

    fn fixed(mime: &'static str, supported: bool) -> Arc<dyn ContainerEncoder> {
        Arc::new(Fixed {
            mime,
            supported,
            output: vec![1, 2, 3],
        })
    }

    fn buffer(channels: usize) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(24_000, vec![vec![0.1; 2_400]; channels]).unwrap())
    }

    #[test]
    fn prefers_mp4_then_mpeg() {
        let enc = CompressedEncoder::empty()
            .register(fixed(MPEG_MIME, true))
            .register(fixed(MP4_MIME, true));
        assert_eq!(enc.negotiate().unwrap().mime_type(), MP4_MIME);

        let enc = CompressedEncoder::empty()
            .register(fixed(MP4_MIME, false))
            .register(fixed(MPEG_MIME, true));
        assert_eq!(enc.negotiate().unwrap().mime_type(), MPEG_MIME);

        let enc = CompressedEncoder::empty().register(fixed("audio/ogg", true));
        assert_eq!(enc.negotiate().unwrap().mime_type(), "audio/ogg");
    }

    #[test]
    fn nothing_supported_is_unavailable() {
        let enc = CompressedEncoder::empty().register(fixed(MP4_MIME, false));
        assert!(matches!(enc.negotiate(), Err(VoiceError::EncodingUnavailable(_))));
        assert!(enc.supported_types().is_empty());
    }

    #[tokio::test]
    async fn encode_labels_blob_and_downmixes_wide_layouts() {
        let enc = CompressedEncoder::empty().register(fixed(MPEG_MIME, true));
        let blob = enc.encode(buffer(6)).await.unwrap();
        assert_eq!(blob.mime_type, MPEG_MIME);
        assert_eq!(blob.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn empty_output_is_an_error() {
        let enc = CompressedEncoder::empty().register(Arc::new(Fixed {
            mime: MP4_MIME,
            supported: true,
            output: Vec::new(),
        }));
        let res = tokio_test::block_on(enc.encode(buffer(1)));
        assert!(matches!(res, Err(VoiceError::Encoding(_))));
    }

    #[cfg(feature = "mp3")]
    #[tokio::test]
    async fn lame_produces_mpeg_frames() {
        let samples: Vec<f32> = (0..24_000).map(|i| (i as f32 * 0.05).sin() * 0.4).collect();
        let buf = Arc::new(SampleBuffer::mono(24_000, samples).unwrap());
        let blob = CompressedEncoder::with_default_backends()
            .encode(buf)
            .await
            .unwrap();
        assert_eq!(blob.mime_type, MPEG_MIME);
        assert!(blob.bytes.len() > 1_000);
        // MPEG frame sync
        let sync = blob
            .bytes
            .windows(2)
            .any(|w| w[0] == 0xFF && (w[1] & 0xE0) == 0xE0);
        assert!(sync);
    }
}
