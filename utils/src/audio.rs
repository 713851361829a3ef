use anyhow::Context;
use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Fixed-point full-scale magnitude of a 16-bit sample.
const FULL_SCALE: f32 = 32768.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Streams audio through a fixed-chunk resampler.
///
/// Input that does not fill a whole chunk is held until the next push, so
/// consecutive pushes come out as one continuous signal with no padding.
pub struct ChunkedResampler {
    resampler: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl ChunkedResampler {
    pub fn new(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<Self> {
        Ok(Self {
            resampler: create_resampler(in_sampling_rate, out_sampling_rate, chunk_size)?,
            pending: Vec::new(),
        })
    }

    /// Resamples every whole chunk available after appending `samples`.
    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match self.resampler.process(&[chunk.as_slice()], None) {
                Ok(resampled) => {
                    if let Some(channel) = resampled.first() {
                        out.extend_from_slice(channel);
                    }
                }
                Err(e) => tracing::warn!("failed to resample audio: {}", e),
            }
        }
        out
    }

    /// Samples waiting for a whole chunk.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Averages interleaved multi-channel samples down to mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

/// Creates a new ring buffer on the heap for shared audio data.
#[cfg(feature = "device")]
pub fn shared_buffer(size: usize) -> ringbuf::HeapRb<f32> {
    ringbuf::HeapRb::new(size)
}

/// Converts normalized samples to 16-bit PCM.
///
/// Input is clamped to [-1.0, 1.0] before scaling, so out-of-range samples
/// saturate at the representable extremes instead of wrapping.
pub fn float_to_pcm16(pcm32: &[f32]) -> Vec<i16> {
    pcm32.iter().map(|&sample| sample_to_pcm16(sample)).collect()
}

/// Converts 16-bit PCM to normalized samples.
pub fn pcm16_to_float(pcm16: &[i16]) -> Vec<f32> {
    pcm16.iter().map(|&sample| sample as f32 / FULL_SCALE).collect()
}

fn sample_to_pcm16(sample: f32) -> i16 {
    // NaN maps to silence
    let sample = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (sample * FULL_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encodes 16-bit samples as base64 of their little-endian bytes.
pub fn encode_pcm16(pcm16: &[i16]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm16.to_binary())
}

/// Decodes base64 little-endian PCM16 back into samples.
pub fn decode_pcm16(base64_fragment: &str) -> anyhow::Result<Vec<i16>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(base64_fragment)
        .context("audio payload is not valid base64")?;
    if bytes.len() % 2 != 0 {
        anyhow::bail!("audio payload has an odd byte count ({})", bytes.len());
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Encodes normalized samples straight to the transport encoding.
pub fn encode(pcm32: &[f32]) -> String {
    encode_pcm16(&float_to_pcm16(pcm32))
}

/// Decodes the transport encoding straight to normalized samples.
pub fn decode(base64_fragment: &str) -> anyhow::Result<Vec<f32>> {
    decode_pcm16(base64_fragment).map(|pcm16| pcm16_to_float(&pcm16))
}

/// A trait for converting audio sample types to a binary representation (Vec<u8>).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter().flat_map(|&sample| sample.to_le_bytes()).collect()
    }
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| sample_to_pcm16(sample).to_le_bytes())
            .collect()
    }
}
