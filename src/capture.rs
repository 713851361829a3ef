use crate::error::SessionError;
use crate::types::audio::{CAPTURE_BLOCK_SIZE, PCM_SAMPLE_RATE};
use crate::types::AudioFrame;
use crate::utils::audio as codec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Input chunk fed to the resampler per call.
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// What the capture pipeline asks of the input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: PCM_SAMPLE_RATE,
            channels: 1,
            block_size: CAPTURE_BLOCK_SIZE,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Format of the raw blocks a device actually delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Receives every raw interleaved block from the device callback.
pub type BlockCallback = Box<dyn FnMut(&[f32], InputFormat) + Send>;

/// Receives every finished frame. Runs on the audio callback, so it must not block.
pub type FrameSink = Box<dyn FnMut(AudioFrame) + Send>;

/// Acquires the microphone.
pub trait Microphone: Send + Sync {
    fn open(
        &self,
        config: &CaptureConfig,
        on_block: BlockCallback,
    ) -> Result<Box<dyn CaptureStream>, SessionError>;
}

/// A live microphone stream.
pub trait CaptureStream: Send {
    /// Stops the stream and releases the device.
    fn close(self: Box<Self>);
}

/// Turns raw device blocks into fixed-size mono PCM16 frames at the wire rate.
pub struct Framer {
    target_rate: u32,
    block_size: usize,
    format: Option<InputFormat>,
    resampler: Option<codec::ChunkedResampler>,
    pending: Vec<f32>,
}

impl Framer {
    pub fn new(target_rate: u32, block_size: usize) -> Self {
        Self {
            target_rate,
            block_size: block_size.max(1),
            format: None,
            resampler: None,
            pending: Vec::new(),
        }
    }

    /// Consumes one raw block and returns every frame it completed.
    pub fn push(&mut self, interleaved: &[f32], format: InputFormat) -> Vec<AudioFrame> {
        if self.format != Some(format) {
            self.reconfigure(format);
        }

        let mono = codec::downmix(interleaved, format.channels as usize);
        match self.resampler.as_mut() {
            None => self.pending.extend_from_slice(&mono),
            Some(resampler) => self.pending.extend(resampler.push(&mono)),
        }

        let mut frames = Vec::new();
        while self.pending.len() >= self.block_size {
            let block: Vec<f32> = self.pending.drain(..self.block_size).collect();
            frames.push(AudioFrame::new(codec::float_to_pcm16(&block), self.target_rate));
        }
        frames
    }

    fn reconfigure(&mut self, format: InputFormat) {
        tracing::debug!(
            "capture input is {}ch @ {}hz, framing to {}hz",
            format.channels,
            format.sample_rate,
            self.target_rate
        );
        self.format = Some(format);
        self.resampler = None;
        if format.sample_rate != self.target_rate {
            match codec::ChunkedResampler::new(
                format.sample_rate as f64,
                self.target_rate as f64,
                RESAMPLER_CHUNK_SIZE,
            ) {
                Ok(resampler) => self.resampler = Some(resampler),
                Err(e) => tracing::error!(
                    "failed to create capture resampler, passing audio through: {:#}",
                    e
                ),
            }
        }
    }
}

/// A running microphone capture feeding frames to a sink.
///
/// Stopping (or dropping) always closes the device stream.
pub struct CapturePipeline {
    stream: Option<Box<dyn CaptureStream>>,
    active: Arc<AtomicBool>,
}

impl CapturePipeline {
    pub fn start(
        microphone: &dyn Microphone,
        config: &CaptureConfig,
        mut sink: FrameSink,
    ) -> Result<Self, SessionError> {
        let active = Arc::new(AtomicBool::new(true));
        let gate = active.clone();
        let mut framer = Framer::new(config.sample_rate, config.block_size);

        let on_block: BlockCallback = Box::new(move |data, format| {
            if !gate.load(Ordering::Acquire) {
                return;
            }
            for frame in framer.push(data, format) {
                sink(frame);
            }
        });

        let stream = microphone.open(config, on_block)?;
        tracing::info!(
            "microphone capture started ({} samples per block)",
            config.block_size
        );
        Ok(Self {
            stream: Some(stream),
            active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            stream.close();
            tracing::info!("microphone released");
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMicrophone;
    use std::sync::Mutex;

    const MONO_16K: InputFormat = InputFormat {
        sample_rate: PCM_SAMPLE_RATE,
        channels: 1,
    };

    #[test]
    fn framer_emits_fixed_size_blocks() {
        let mut framer = Framer::new(PCM_SAMPLE_RATE, 4);
        assert!(framer.push(&[0.5, 0.5, 0.5], MONO_16K).is_empty());

        let frames = framer.push(&[0.5, -0.5, 0.0, 0.0, 0.0, 0.25], MONO_16K);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), &[16384, 16384, 16384, 16384]);
        assert_eq!(frames[1].samples(), &[-16384, 0, 0, 0]);
        assert!(frames.iter().all(|f| f.sample_rate() == PCM_SAMPLE_RATE));
    }

    #[test]
    fn framer_downmixes_stereo() {
        let mut framer = Framer::new(PCM_SAMPLE_RATE, 2);
        let stereo = InputFormat {
            sample_rate: PCM_SAMPLE_RATE,
            channels: 2,
        };
        let frames = framer.push(&[1.0, 0.0, -1.0, 0.0], stereo);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[16384, -16384]);
    }

    #[test]
    fn framer_resamples_to_target_rate() {
        let mut framer = Framer::new(PCM_SAMPLE_RATE, 1600);
        let device = InputFormat {
            sample_rate: 48_000,
            channels: 1,
        };
        let mut produced = 0;
        for _ in 0..10 {
            for frame in framer.push(&vec![0.1; 4800], device) {
                assert_eq!(frame.len(), 1600);
                produced += frame.len();
            }
        }
        // one second of 48k input gives roughly one second of 16k output
        assert!(produced >= 12_800 && produced <= 16_000, "produced {}", produced);
    }

    #[test]
    fn pipeline_forwards_frames_until_stopped() {
        let microphone = FakeMicrophone::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = received.clone();
        let config = CaptureConfig {
            block_size: 2,
            ..CaptureConfig::default()
        };

        let mut pipeline = CapturePipeline::start(
            microphone.as_ref(),
            &config,
            Box::new(move |frame| sink_received.lock().unwrap().push(frame)),
        )
        .unwrap();
        assert_eq!(microphone.open_streams(), 1);
        assert!(microphone.last_config().unwrap().echo_cancellation);

        microphone.push(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(received.lock().unwrap().len(), 2);

        pipeline.stop();
        assert!(!pipeline.is_active());
        assert_eq!(microphone.open_streams(), 0);
        microphone.push(&[0.0, 0.0]);
        assert_eq!(received.lock().unwrap().len(), 2);

        pipeline.stop();
        assert_eq!(microphone.closes(), 1);
    }

    #[test]
    fn dropping_the_pipeline_releases_the_device() {
        let microphone = FakeMicrophone::new();
        let pipeline =
            CapturePipeline::start(microphone.as_ref(), &CaptureConfig::default(), Box::new(|_| {}))
                .unwrap();
        drop(pipeline);
        assert_eq!(microphone.open_streams(), 0);
    }

    #[test]
    fn unavailable_microphone_is_a_device_error() {
        let microphone = FakeMicrophone::unavailable();
        let result =
            CapturePipeline::start(microphone.as_ref(), &CaptureConfig::default(), Box::new(|_| {}));
        assert!(matches!(result, Err(SessionError::Device(_))));
    }
}
