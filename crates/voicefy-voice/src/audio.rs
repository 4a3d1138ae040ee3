//! Decoded audio and the PCM decoder.
//!
//! The speech API returns 16-bit signed little-endian interleaved PCM (base64 on the wire).
//! Each sample maps to `s / 32768`, so the range is [-1.0, 1.0) and +1.0 is never produced.

use crate::error::{VoiceError, VoiceResult};
use base64::Engine as _;
use std::io::Cursor;
use std::time::Duration;

/// Sample rate the speech API produces.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_CHANNELS: u16 = 1;
/// Highest sample rate a buffer may declare.
pub const MAX_SAMPLE_RATE: u32 = 384_000;
/// Most channels a buffer may carry.
pub const MAX_CHANNELS: u16 = 32;

/// Declared layout of a raw PCM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl PcmFormat {
    /// Read `rate=` and `channels=` parameters from a mime string such as
    /// `audio/L16;codec=pcm;rate=24000`. Missing, unparseable or out-of-range parameters keep
    /// the defaults.
    pub fn from_mime(mime: &str) -> Self {
        let mut format = Self::default();
        for param in mime.split(';').skip(1) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => {
                    if let Ok(rate) = value.parse::<u32>() {
                        if (1..=MAX_SAMPLE_RATE).contains(&rate) {
                            format.sample_rate = rate;
                        }
                    }
                }
                "channels" => {
                    if let Ok(ch) = value.parse::<u16>() {
                        if (1..=MAX_CHANNELS).contains(&ch) {
                            format.channels = ch;
                        }
                    }
                }
                _ => {}
            }
        }
        format
    }
}

/// Decoded, channel-separated audio. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Build from per-channel samples. All channels must have the same length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> VoiceResult<Self> {
        if channels.is_empty() {
            return Err(VoiceError::MalformedAudio("buffer has no channels".into()));
        }
        if channels.len() > MAX_CHANNELS as usize {
            return Err(VoiceError::MalformedAudio(format!(
                "{} channels exceeds the limit of {}",
                channels.len(),
                MAX_CHANNELS
            )));
        }
        if !(1..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(VoiceError::MalformedAudio(format!(
                "sample rate {} is outside 1..={}",
                sample_rate, MAX_SAMPLE_RATE
            )));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(VoiceError::MalformedAudio(
                "channels have different lengths".into(),
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Single-channel buffer.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> VoiceResult<Self> {
        Self::new(sample_rate, vec![samples])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Sample at (frame, channel). Panics when out of range.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.channels[channel][frame]
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Samples interleaved frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let ch = self.channels.len();
        let mut out = Vec::with_capacity(self.frames() * ch);
        for frame in 0..self.frames() {
            for c in &self.channels {
                out.push(c[frame]);
            }
        }
        out
    }

    /// Average of all channels per frame.
    pub fn mixdown(&self) -> Vec<f32> {
        let n = self.channels.len() as f32;
        (0..self.frames())
            .map(|f| self.channels.iter().map(|c| c[f]).sum::<f32>() / n)
            .collect()
    }

    /// Read a 16-bit PCM WAV blob (as written by [`crate::wav::encode_wav`]).
    pub fn from_wav_bytes(bytes: &[u8]) -> VoiceResult<Self> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(VoiceError::MalformedAudio(format!(
                "unsupported WAV layout: {:?} {} bit",
                spec.sample_format, spec.bits_per_sample
            )));
        }
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(VoiceError::MalformedAudio("WAV declares zero channels".into()));
        }
        let mut out = vec![Vec::new(); channels];
        for (i, s) in reader.samples::<i16>().enumerate() {
            out[i % channels].push(s? as f32 / 32768.0);
        }
        // drop a trailing partial frame
        let frames = out.iter().map(Vec::len).min().unwrap_or(0);
        for c in &mut out {
            c.truncate(frames);
        }
        Self::new(spec.sample_rate, out)
    }
}

/// Decode 16-bit signed little-endian interleaved PCM.
///
/// Fails when `channels` is zero or the byte length is not a multiple of `2 * channels`.
pub fn decode_pcm16(bytes: &[u8], format: PcmFormat) -> VoiceResult<SampleBuffer> {
    if format.channels == 0 {
        return Err(VoiceError::MalformedAudio("channel count is zero".into()));
    }
    let channels = format.channels as usize;
    let frame_bytes = 2 * channels;
    if bytes.len() % frame_bytes != 0 {
        return Err(VoiceError::MalformedAudio(format!(
            "{} bytes is not a whole number of {}-channel 16-bit frames",
            bytes.len(),
            channels
        )));
    }
    let frames = bytes.len() / frame_bytes;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let s = i16::from_le_bytes([pair[0], pair[1]]);
        out[i % channels].push(s as f32 / 32768.0);
    }
    SampleBuffer::new(format.sample_rate, out)
}

/// Decode a base64 inline payload, then the PCM inside it.
pub fn decode_base64_pcm(data: &str, format: PcmFormat) -> VoiceResult<SampleBuffer> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim())?;
    decode_pcm16(&bytes, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_samples() {
        let buf = decode_pcm16(&[0x00, 0x80, 0x00, 0x00, 0xFF, 0x7F], PcmFormat::default()).unwrap();
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.sample_rate(), 24_000);
        let ch = buf.channel(0).unwrap();
        assert_eq!(ch[0], -1.0);
        assert_eq!(ch[1], 0.0);
        assert!((ch[2] - 0.999_969).abs() < 1e-6);
    }

    #[test]
    fn deinterleaves_stereo() {
        let format = PcmFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        // L=0x4000, R=0xC000 for two frames
        let bytes = [0x00, 0x40, 0x00, 0xC0, 0x00, 0x40, 0x00, 0xC0];
        let buf = decode_pcm16(&bytes, format).unwrap();
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(0).unwrap(), &[0.5, 0.5]);
        assert_eq!(buf.channel(1).unwrap(), &[-0.5, -0.5]);
    }

    #[test]
    fn rejects_partial_frames_and_zero_channels() {
        assert!(matches!(
            decode_pcm16(&[0x00, 0x00, 0x01], PcmFormat::default()),
            Err(VoiceError::MalformedAudio(_))
        ));
        let stereo = PcmFormat {
            sample_rate: 24_000,
            channels: 2,
        };
        assert!(decode_pcm16(&[0, 0, 0, 0, 0, 0], stereo).is_err());
        let none = PcmFormat {
            sample_rate: 24_000,
            channels: 0,
        };
        assert!(decode_pcm16(&[0, 0], none).is_err());
    }

    #[test]
    fn empty_payload_is_an_empty_buffer() {
        let buf = decode_pcm16(&[], PcmFormat::default()).unwrap();
        assert_eq!(buf.frames(), 0);
        assert_eq!(buf.duration(), Duration::ZERO);
    }

    #[test]
    fn base64_payload() {
        // [0x00, 0x80, 0xFF, 0x7F]
        let buf = decode_base64_pcm("AID/fw==", PcmFormat::default()).unwrap();
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.sample(0, 0), -1.0);
        assert!(matches!(
            decode_base64_pcm("not base64!!", PcmFormat::default()),
            Err(VoiceError::MalformedAudio(_))
        ));
    }

    #[test]
    fn mime_parameters() {
        let f = PcmFormat::from_mime("audio/L16;codec=pcm;rate=24000");
        assert_eq!(f, PcmFormat::default());
        let f = PcmFormat::from_mime("audio/L16; rate=16000; channels=2");
        assert_eq!(f.sample_rate, 16_000);
        assert_eq!(f.channels, 2);
        let f = PcmFormat::from_mime("audio/L16;rate=fast");
        assert_eq!(f.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn buffer_rejects_ragged_channels() {
        assert!(SampleBuffer::new(24_000, vec![vec![0.0; 3], vec![0.0; 2]]).is_err());
        assert!(SampleBuffer::new(24_000, vec![]).is_err());
    }

    #[test]
    fn absurd_mime_rates_keep_the_default() {
        let f = PcmFormat::from_mime("audio/L16;codec=pcm;rate=3000000000");
        assert_eq!(f.sample_rate, DEFAULT_SAMPLE_RATE);
        let f = PcmFormat::from_mime("audio/L16;rate=384000;channels=40000");
        assert_eq!(f.sample_rate, MAX_SAMPLE_RATE);
        assert_eq!(f.channels, DEFAULT_CHANNELS);

        let buf = decode_pcm16(&[0, 0], PcmFormat::from_mime("audio/L16;rate=3000000000")).unwrap();
        assert_eq!(buf.sample_rate(), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn buffer_rejects_out_of_range_layouts() {
        assert!(matches!(
            SampleBuffer::mono(MAX_SAMPLE_RATE + 1, vec![0.0]),
            Err(VoiceError::MalformedAudio(_))
        ));
        assert!(SampleBuffer::mono(MAX_SAMPLE_RATE, vec![0.0]).is_ok());
        let format = PcmFormat {
            sample_rate: 3_000_000_000,
            channels: 1,
        };
        assert!(matches!(decode_pcm16(&[0, 0], format), Err(VoiceError::MalformedAudio(_))));
        let wide = vec![vec![0.0]; MAX_CHANNELS as usize + 1];
        assert!(SampleBuffer::new(24_000, wide).is_err());
    }
}
