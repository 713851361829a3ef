//! Fakes for the device and transport seams, shared by the unit tests.

use crate::capture::{BlockCallback, CaptureConfig, CaptureStream, InputFormat, Microphone};
use crate::client::{Config, Connection, Connector, TransportEvent};
use crate::error::SessionError;
use crate::playback::{AudioOutput, Speaker};
use crate::types::{AudioFrame, ClientEvent, ServerEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

/// A tiny frame whose samples all equal `tag`, so plays can be told apart.
pub fn frame(tag: i16) -> AudioFrame {
    AudioFrame::new(vec![tag; 4], 16_000)
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[derive(Debug, Clone)]
pub struct Play {
    pub tag: i16,
    pub rate: u32,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct SpeakerLog {
    started: Mutex<Vec<i16>>,
    plays: Mutex<Vec<Play>>,
    opens: AtomicUsize,
    open_outputs: AtomicUsize,
    playing: AtomicUsize,
    max_concurrent: AtomicUsize,
}

/// Records every segment played; each play takes `delay`.
pub struct FakeSpeaker {
    delay: Duration,
    open_delay: Duration,
    available: bool,
    log: Arc<SpeakerLog>,
}

impl FakeSpeaker {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            open_delay: Duration::ZERO,
            available: true,
            log: Arc::new(SpeakerLog::default()),
        })
    }

    /// Blocks the calling thread for `open_delay` in every `open`, like a
    /// device that takes a while to start.
    pub fn slow_to_open(open_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(1),
            open_delay,
            available: true,
            log: Arc::new(SpeakerLog::default()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            open_delay: Duration::ZERO,
            available: false,
            log: Arc::new(SpeakerLog::default()),
        })
    }

    pub fn plays(&self) -> Vec<Play> {
        self.log.plays.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.log.opens.load(Ordering::SeqCst)
    }

    pub fn open_outputs(&self) -> usize {
        self.log.open_outputs.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.log.max_concurrent.load(Ordering::SeqCst)
    }

    pub async fn wait_for_plays(&self, count: usize) {
        wait_until(|| self.log.plays.lock().unwrap().len() >= count, "plays").await;
    }

    pub async fn wait_for_start(&self, count: usize) {
        wait_until(|| self.log.started.lock().unwrap().len() >= count, "play start").await;
    }
}

impl Speaker for FakeSpeaker {
    fn open(&self) -> Result<Box<dyn AudioOutput>, SessionError> {
        if !self.available {
            return Err(SessionError::Device("no output device".to_string()));
        }
        std::thread::sleep(self.open_delay);
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        self.log.open_outputs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOutput {
            delay: self.delay,
            log: self.log.clone(),
        }))
    }
}

struct FakeOutput {
    delay: Duration,
    log: Arc<SpeakerLog>,
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn play(&mut self, frame: AudioFrame) -> anyhow::Result<()> {
        let tag = frame.samples().first().copied().unwrap_or_default();
        let now_playing = self.log.playing.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_concurrent.fetch_max(now_playing, Ordering::SeqCst);
        self.log.started.lock().unwrap().push(tag);
        let started = Instant::now();
        tokio::time::sleep(self.delay).await;
        self.log.playing.fetch_sub(1, Ordering::SeqCst);
        self.log.plays.lock().unwrap().push(Play {
            tag,
            rate: frame.sample_rate(),
            started,
            finished: Instant::now(),
        });
        Ok(())
    }
}

impl Drop for FakeOutput {
    fn drop(&mut self) {
        self.log.open_outputs.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A microphone driven by hand through [`FakeMicrophone::push`].
pub struct FakeMicrophone {
    available: bool,
    callback: Arc<Mutex<Option<BlockCallback>>>,
    last_config: Mutex<Option<CaptureConfig>>,
    open_streams: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FakeMicrophone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            available: true,
            callback: Arc::new(Mutex::new(None)),
            last_config: Mutex::new(None),
            open_streams: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        let mut microphone = Self::new();
        if let Some(microphone) = Arc::get_mut(&mut microphone) {
            microphone.available = false;
        }
        microphone
    }

    /// Delivers one mono 16 kHz block, as a device callback would.
    pub fn push(&self, samples: &[f32]) {
        let format = InputFormat {
            sample_rate: 16_000,
            channels: 1,
        };
        if let Some(callback) = self.callback.lock().unwrap().as_mut() {
            callback(samples, format);
        }
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<CaptureConfig> {
        self.last_config.lock().unwrap().clone()
    }
}

struct FakeCaptureStream {
    callback: Arc<Mutex<Option<BlockCallback>>>,
    open_streams: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl CaptureStream for FakeCaptureStream {
    fn close(self: Box<Self>) {
        self.callback.lock().unwrap().take();
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Microphone for FakeMicrophone {
    fn open(
        &self,
        config: &CaptureConfig,
        on_block: BlockCallback,
    ) -> Result<Box<dyn CaptureStream>, SessionError> {
        if !self.available {
            return Err(SessionError::Device("microphone permission denied".to_string()));
        }
        *self.last_config.lock().unwrap() = Some(config.clone());
        *self.callback.lock().unwrap() = Some(on_block);
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCaptureStream {
            callback: self.callback.clone(),
            open_streams: self.open_streams.clone(),
            closes: self.closes.clone(),
        }))
    }
}

/// The service side of a fake connection.
pub struct RemoteEnd {
    from_client: mpsc::Receiver<ClientEvent>,
    to_client: mpsc::Sender<TransportEvent>,
}

impl RemoteEnd {
    pub async fn send(&self, event: ServerEvent) {
        self.to_client
            .send(TransportEvent::Message(event))
            .await
            .expect("session stopped reading");
    }

    pub async fn close(&self, reason: &str) {
        self.to_client
            .send(TransportEvent::Closed(Some(reason.to_string())))
            .await
            .expect("session stopped reading");
    }

    pub async fn fail(&self, error: &str) {
        self.to_client
            .send(TransportEvent::Error(error.to_string()))
            .await
            .expect("session stopped reading");
    }

    /// Next message the client sent.
    pub async fn next(&mut self) -> ClientEvent {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("client closed the connection")
    }

    /// Whether the client has dropped its sending half.
    pub async fn is_closed_by_client(&mut self) -> bool {
        loop {
            match tokio::time::timeout(WAIT, self.from_client.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

/// Hands out channel-backed connections and keeps their remote ends.
pub struct FakeConnector {
    refuse: bool,
    delay: Duration,
    remotes: Mutex<VecDeque<RemoteEnd>>,
    agent_ids: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refuse: false,
            delay: Duration::ZERO,
            remotes: Mutex::new(VecDeque::new()),
            agent_ids: Mutex::new(Vec::new()),
        })
    }

    pub fn refusing() -> Arc<Self> {
        let mut connector = Self::new();
        if let Some(connector) = Arc::get_mut(&mut connector) {
            connector.refuse = true;
        }
        connector
    }

    /// Takes `delay` to establish each connection.
    pub fn slow(delay: Duration) -> Arc<Self> {
        let mut connector = Self::new();
        if let Some(connector) = Arc::get_mut(&mut connector) {
            connector.delay = delay;
        }
        connector
    }

    pub async fn wait_for_connects(&self, count: usize) {
        wait_until(|| self.connects() >= count, "connect attempts").await;
    }

    pub fn opened(&self) -> usize {
        self.remotes.lock().unwrap().len()
    }

    pub fn take_remote(&self) -> RemoteEnd {
        self.remotes
            .lock()
            .unwrap()
            .pop_front()
            .expect("no connection was opened")
    }

    pub fn connects(&self) -> usize {
        self.agent_ids.lock().unwrap().len()
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agent_ids.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _config: &Config, agent_id: &str) -> Result<Connection, SessionError> {
        self.agent_ids.lock().unwrap().push(agent_id.to_string());
        tokio::time::sleep(self.delay).await;
        if self.refuse {
            return Err(SessionError::Transport("connection refused".to_string()));
        }
        let (c_tx, c_rx) = mpsc::channel(64);
        let (s_tx, s_rx) = mpsc::channel(64);
        self.remotes.lock().unwrap().push_back(RemoteEnd {
            from_client: c_rx,
            to_client: s_tx,
        });
        Ok(Connection::new(c_tx, s_rx))
    }
}
