use crate::error::SessionError;
use crate::types::AudioFrame;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// An open audio output.
#[async_trait]
pub trait AudioOutput: Send {
    /// Plays `frame` directly after the previous one. Resolves once the
    /// device has taken the whole frame, so the next call continues without
    /// a gap and without overlapping.
    async fn play(&mut self, frame: AudioFrame) -> anyhow::Result<()>;
}

/// Acquires the audio output device.
pub trait Speaker: Send + Sync {
    /// May block while the device starts. The scheduler only calls it from
    /// the blocking pool.
    fn open(&self) -> Result<Box<dyn AudioOutput>, SessionError>;
}

async fn open_output(speaker: Arc<dyn Speaker>) -> Result<Box<dyn AudioOutput>, SessionError> {
    tokio::task::spawn_blocking(move || speaker.open())
        .await
        .map_err(SessionError::device)?
}

#[derive(Default)]
struct PlaybackState {
    pending: VecDeque<AudioFrame>,
    /// The output while idle. A running drain loop holds it instead.
    output: Option<Box<dyn AudioOutput>>,
    draining: bool,
    /// Bumped by `reset`; a drain loop from an older epoch exits.
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

/// Plays received audio back to back, in arrival order.
///
/// At most one drain loop runs at a time. It starts on the first `enqueue`
/// after being idle and stops once the queue is empty.
#[derive(Clone)]
pub struct PlaybackScheduler {
    speaker: Arc<dyn Speaker>,
    state: Arc<Mutex<PlaybackState>>,
}

fn lock(state: &Mutex<PlaybackState>) -> MutexGuard<'_, PlaybackState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlaybackScheduler {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        Self {
            speaker,
            state: Arc::new(Mutex::new(PlaybackState::default())),
        }
    }

    /// Opens the output ahead of the first segment so device errors surface early.
    ///
    /// An output opened after a concurrent `reset` is released straight away.
    pub async fn prepare(&self) -> Result<(), SessionError> {
        let epoch = {
            let state = lock(&self.state);
            if state.output.is_some() || state.draining {
                return Ok(());
            }
            state.epoch
        };
        let output = open_output(self.speaker.clone()).await?;
        let unused = {
            let mut state = lock(&self.state);
            if state.epoch == epoch && state.output.is_none() && !state.draining {
                state.output = Some(output);
                None
            } else {
                Some(output)
            }
        };
        drop(unused);
        Ok(())
    }

    /// Queues a segment without waiting. Never drops it.
    pub fn enqueue(&self, frame: AudioFrame) {
        let mut state = lock(&self.state);
        state.pending.push_back(frame);
        if !state.draining {
            state.draining = true;
            let epoch = state.epoch;
            state.task = Some(tokio::spawn(drain(
                self.state.clone(),
                self.speaker.clone(),
                epoch,
            )));
        }
    }

    /// Drops every segment that has not started playing yet. The segment
    /// currently playing is left to finish.
    pub fn flush(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.pending.len();
        state.pending.clear();
        if dropped > 0 {
            tracing::debug!("flushed {} pending playback segments", dropped);
        }
        dropped
    }

    /// Flushes, stops the drain loop and releases the output device.
    /// A later `enqueue` opens the device again.
    pub fn reset(&self) {
        let (task, output) = {
            let mut state = lock(&self.state);
            state.pending.clear();
            state.draining = false;
            state.epoch += 1;
            (state.task.take(), state.output.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        drop(output);
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn is_draining(&self) -> bool {
        lock(&self.state).draining
    }
}

async fn drain(state: Arc<Mutex<PlaybackState>>, speaker: Arc<dyn Speaker>, epoch: u64) {
    let mut output = {
        let mut st = lock(&state);
        if st.epoch != epoch {
            return;
        }
        st.output.take()
    };

    loop {
        let frame = {
            let mut st = lock(&state);
            if st.epoch != epoch {
                return;
            }
            match st.pending.pop_front() {
                Some(frame) => frame,
                None => {
                    st.draining = false;
                    st.task = None;
                    st.output = output;
                    return;
                }
            }
        };

        if output.is_none() {
            match open_output(speaker.clone()).await {
                Ok(opened) => output = Some(opened),
                Err(e) => {
                    let mut st = lock(&state);
                    if st.epoch == epoch {
                        tracing::error!(
                            "failed to open audio output, discarding {} segments: {}",
                            st.pending.len() + 1,
                            e
                        );
                        st.pending.clear();
                        st.draining = false;
                        st.task = None;
                    }
                    return;
                }
            }
        }

        if let Some(out) = output.as_mut() {
            if let Err(e) = out.play(frame).await {
                tracing::warn!("failed to play audio segment: {:#}", e);
            }
        }
    }
}
