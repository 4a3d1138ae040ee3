//! Lossless WAV export: canonical 44-byte header followed by interleaved 16-bit PCM.

use crate::audio::SampleBuffer;

pub const WAV_MIME: &str = "audio/wav";
const HEADER_LEN: usize = 44;

/// Quantize one sample: clamp to [-1, 1], scale negatives below -0.5 by 32768 and
/// everything else by 32767, then truncate toward zero. NaN becomes 0.
pub fn quantize(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if 0.5 + s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled as i16
}

/// Encode a buffer as a RIFF/WAVE PCM file. Pure and deterministic.
pub fn encode_wav(buffer: &SampleBuffer) -> Vec<u8> {
    let channels = buffer.channel_count();
    let sample_rate = buffer.sample_rate();
    let block_align = 2 * channels;
    // rate and channel count are bounded by `SampleBuffer`; oversize data saturates the RIFF size
    let data_len = (buffer.frames() as u64 * block_align as u64).min((u32::MAX - 36) as u64) as u32;

    let mut buf = Vec::with_capacity(HEADER_LEN + buffer.frames() * block_align as usize);
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes()); // byte rate
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..buffer.frames() {
        for channel in buffer.channels() {
            buf.extend_from_slice(&quantize(channel[frame]).to_le_bytes());
        }
    }
    buf
}
