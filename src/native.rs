//! Microphone and speaker backed by `cpal`.
//!
//! `cpal::Stream` cannot move between threads, so every stream is built,
//! played and finally dropped on a dedicated thread that parks until its
//! owner closes it.

use crate::capture::{BlockCallback, CaptureConfig, CaptureStream, InputFormat, Microphone};
use crate::error::SessionError;
use crate::playback::{AudioOutput, Speaker};
use crate::types::AudioFrame;
use crate::utils;
use anyhow::Context;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapProd;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

const INPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_LATENCY_MS: usize = 1000;
const RESAMPLER_CHUNK_SIZE: usize = 100;
const PUSH_RETRY: Duration = Duration::from_millis(10);

struct StreamThread {
    stop: Option<std_mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StreamThread {
    /// Runs `build` on a new thread and waits until the stream is playing.
    fn spawn<T, F>(name: &str, build: F) -> Result<(Self, T), SessionError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<(cpal::Stream, T)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<T, String>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let started = build().and_then(|(stream, info)| {
                    stream.play().context("Failed to start stream")?;
                    Ok((stream, info))
                });
                let stream = match started {
                    Ok((stream, info)) => {
                        let _ = ready_tx.send(Ok(info));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                // parked until the owner drops its sender
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(SessionError::device)?;

        match ready_rx.recv() {
            Ok(Ok(info)) => Ok((
                Self {
                    stop: Some(stop_tx),
                    handle: Some(handle),
                },
                info,
            )),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(SessionError::Device(e))
            }
            Err(_) => Err(SessionError::Device(format!("{} thread exited early", name))),
        }
    }

    fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Captures from the named input device, or the host default.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
        }
    }
}

struct CpalCaptureStream {
    thread: StreamThread,
}

impl CaptureStream for CpalCaptureStream {
    fn close(mut self: Box<Self>) {
        self.thread.stop();
    }
}

impl Microphone for CpalMicrophone {
    fn open(
        &self,
        config: &CaptureConfig,
        mut on_block: BlockCallback,
    ) -> Result<Box<dyn CaptureStream>, SessionError> {
        if config.echo_cancellation || config.noise_suppression {
            tracing::debug!("echo cancellation and noise suppression are left to the OS audio stack");
        }
        let device_name = self.device_name.clone();

        let (thread, input_config) = StreamThread::spawn("voice-capture", move || {
            let input = utils::device::get_or_default_input(device_name.as_deref())?;
            let default_config = input
                .default_input_config()
                .context("Failed to get default input config")?;
            let input_config = StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.sample_rate(),
                buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
            };
            tracing::info!(
                "input: device={:?}, config={:?}",
                input.name().unwrap_or_default(),
                &input_config
            );

            let format = InputFormat {
                sample_rate: input_config.sample_rate.0,
                channels: input_config.channels,
            };
            let stream = input
                .build_input_stream(
                    &input_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| on_block(data, format),
                    move |err| tracing::error!("an error occurred on input stream: {}", err),
                    None,
                )
                .context("Failed to build input stream")?;
            Ok((stream, input_config))
        })?;

        tracing::debug!("capturing at {:?}", input_config);
        Ok(Box::new(CpalCaptureStream { thread }))
    }
}

/// Plays through the named output device, or the host default.
#[derive(Debug, Clone, Default)]
pub struct CpalSpeaker {
    device_name: Option<String>,
}

impl CpalSpeaker {
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
        }
    }
}

impl Speaker for CpalSpeaker {
    fn open(&self) -> Result<Box<dyn AudioOutput>, SessionError> {
        let device_name = self.device_name.clone();

        let (thread, (producer, output_rate)) = StreamThread::spawn("voice-playback", move || {
            let output = utils::device::get_or_default_output(device_name.as_deref())?;
            let default_config = output
                .default_output_config()
                .context("Failed to get default output config")?;
            let output_config = StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.sample_rate(),
                buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
            };
            let output_channel_count = output_config.channels as usize;
            let output_rate = output_config.sample_rate.0;
            tracing::info!(
                "output: device={:?}, config={:?}",
                output.name().unwrap_or_default(),
                &output_config
            );

            let buffer = utils::audio::shared_buffer(output_rate as usize * OUTPUT_LATENCY_MS / 1000);
            let (producer, mut consumer) = buffer.split();

            let stream = output
                .build_output_stream(
                    &output_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        // mono source copied to every channel
                        for frame in data.chunks_mut(output_channel_count.max(1)) {
                            let sample = consumer.try_pop().unwrap_or(0.0);
                            frame.fill(sample);
                        }
                    },
                    move |err| tracing::error!("an error occurred on output stream: {}", err),
                    None,
                )
                .context("Failed to build output stream")?;
            Ok((stream, (producer, output_rate)))
        })?;

        Ok(Box::new(CpalOutput {
            producer,
            output_rate,
            resampler: None,
            _thread: thread,
        }))
    }
}

struct CpalOutput {
    producer: HeapProd<f32>,
    output_rate: u32,
    /// Kept across plays so a segment's unconsumed tail leads into the next one.
    resampler: Option<(u32, utils::audio::ChunkedResampler)>,
    _thread: StreamThread,
}

impl CpalOutput {
    fn convert(&mut self, frame: &AudioFrame) -> Vec<f32> {
        let samples = utils::audio::pcm16_to_float(frame.samples());
        let source_rate = frame.sample_rate();
        if source_rate == self.output_rate {
            self.resampler = None;
            return samples;
        }
        if self.resampler.as_ref().map(|(rate, _)| *rate) != Some(source_rate) {
            match utils::audio::ChunkedResampler::new(
                source_rate as f64,
                self.output_rate as f64,
                RESAMPLER_CHUNK_SIZE,
            ) {
                Ok(resampler) => self.resampler = Some((source_rate, resampler)),
                Err(e) => {
                    tracing::warn!("cannot resample {}hz playback audio: {:#}", source_rate, e);
                    return samples;
                }
            }
        }
        match self.resampler.as_mut() {
            Some((_, resampler)) => resampler.push(&samples),
            None => samples,
        }
    }
}

#[async_trait]
impl AudioOutput for CpalOutput {
    async fn play(&mut self, frame: AudioFrame) -> anyhow::Result<()> {
        let samples = self.convert(&frame);
        let mut offset = 0;
        while offset < samples.len() {
            offset += self.producer.push_slice(&samples[offset..]);
            if offset < samples.len() {
                tokio::time::sleep(PUSH_RETRY).await;
            }
        }
        Ok(())
    }
}
