//! Linear PCM quantization for the audio channel
//!
//! Samples are mono `f32` in `[-1.0, 1.0]`, scaled by 32767 and truncated
//! toward zero into `i16`. The sample range is symmetric, so `-32768` is never
//! produced. Samples are packed **little-endian** on the wire regardless of
//! host byte order; receivers must decode them the same way.

use crate::protocol::frame::ChannelTag;

/// Full-scale magnitude of a quantized sample
pub const SAMPLE_SCALE: f32 = 32767.0;

/// Bytes per encoded sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Quantize one sample. Out-of-range input saturates; NaN maps to silence.
pub fn quantize_sample(sample: f32) -> i16 {
    (sample * SAMPLE_SCALE).clamp(-SAMPLE_SCALE, SAMPLE_SCALE) as i16
}

/// Build a complete audio frame: tag byte followed by packed samples.
///
/// The result is always `1 + 2 * samples.len()` bytes.
pub fn encode_audio_frame(samples: &[f32]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + BYTES_PER_SAMPLE * samples.len());
    frame.push(ChannelTag::Audio.as_byte());
    for &sample in samples {
        frame.extend_from_slice(&quantize_sample(sample).to_le_bytes());
    }
    frame
}

/// Unpack an audio payload (tag already stripped). A trailing odd byte is ignored.
pub fn decode_pcm(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Convert quantized samples back to `f32` in `[-1.0, 1.0]`
pub fn pcm_to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (s as f32 / SAMPLE_SCALE).max(-1.0))
        .collect()
}
