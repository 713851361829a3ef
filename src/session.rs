use crate::capture::{CaptureConfig, CapturePipeline, FrameSink, Microphone};
use crate::client::{Config, Connection, Connector, Transport, TransportEvent};
use crate::directive;
use crate::error::SessionError;
use crate::event_log::{EventLogger, EventSink};
use crate::playback::{PlaybackScheduler, Speaker};
use crate::telephony::Telephony;
use crate::transcript::Transcript;
use crate::types::audio::PCM_SAMPLE_RATE;
use crate::types::events::client::{
    PongEvent, SessionInitEvent, UserAudioChunkEvent, UserMessageEvent,
};
use crate::types::{
    AudioFrame, ClientEvent, EntryId, EventKind, Role, ServerEvent, Status, TranscriptEntry,
};
use crate::utils::audio as codec;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// How many recent transcript entries go into a call summary.
pub const SUMMARY_ENTRIES: usize = 10;

const UPDATES_CAPACITY: usize = 256;

type StartReply = oneshot::Sender<Result<(), SessionError>>;

/// Everything that reaches the session core, applied one at a time.
pub(crate) enum Input {
    Start(StartReply),
    Stop(oneshot::Sender<()>),
    SendText(String),
    Snapshot(oneshot::Sender<Vec<TranscriptEntry>>),
    /// Devices are held and the connect attempt has finished.
    Opened {
        generation: u64,
        result: Result<Connection, SessionError>,
    },
    Transport { generation: u64, event: TransportEvent },
    Captured { generation: u64, frame: AudioFrame },
    CallFinished { generation: u64, update: SessionUpdate },
}

/// Notifications for whoever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StatusChanged(Status),
    TranscriptAppended(TranscriptEntry),
    CallPlaced {
        entry_id: EntryId,
        call_id: Option<String>,
    },
    CallFailed {
        entry_id: EntryId,
        reason: String,
    },
}

/// Collaborators a session is built from.
pub(crate) struct SessionParts {
    pub config: Config,
    pub connector: Arc<dyn Connector>,
    pub microphone: Arc<dyn Microphone>,
    pub capture_config: CaptureConfig,
    pub speaker: Arc<dyn Speaker>,
    pub telephony: Arc<dyn Telephony>,
    pub logger: Arc<dyn EventLogger>,
}

/// Where the opening task leaves the microphone. Teardown closes the slot,
/// and a pipeline arriving after that is released on the spot.
#[derive(Default)]
struct CaptureSlot {
    pipeline: Option<CapturePipeline>,
    closed: bool,
}

fn lock_slot(slot: &Mutex<CaptureSlot>) -> MutexGuard<'_, CaptureSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureSlot {
    fn fill(slot: &Mutex<CaptureSlot>, pipeline: CapturePipeline) {
        let mut guard = lock_slot(slot);
        if guard.closed {
            drop(guard);
            drop(pipeline);
        } else {
            guard.pipeline = Some(pipeline);
        }
    }

    fn release(slot: &Mutex<CaptureSlot>) {
        let pipeline = {
            let mut guard = lock_slot(slot);
            guard.closed = true;
            guard.pipeline.take()
        };
        if let Some(mut pipeline) = pipeline {
            pipeline.stop();
        }
    }
}

struct ActiveSession {
    id: String,
    generation: u64,
    agent_id: String,
    /// Rate of the agent audio, as announced by `session_ready`.
    audio_rate: u32,
    transport: Option<Transport>,
    capture: Arc<Mutex<CaptureSlot>>,
    opening: Option<JoinHandle<()>>,
    pending_start: Option<StartReply>,
}

/// Acquires the devices and connects, off the session task so a `Stop`
/// is never queued behind a slow device or handshake.
struct Opening {
    generation: u64,
    agent_id: String,
    config: Config,
    connector: Arc<dyn Connector>,
    microphone: Arc<dyn Microphone>,
    capture_config: CaptureConfig,
    playback: PlaybackScheduler,
    capture: Arc<Mutex<CaptureSlot>>,
    inputs: mpsc::WeakSender<Input>,
}

impl Opening {
    async fn run(self) {
        let result = self.open().await;
        let Some(inputs) = self.inputs.upgrade() else {
            tracing::debug!("session task went away while connecting");
            discard(result);
            return;
        };
        let generation = self.generation;
        if let Err(mpsc::error::SendError(Input::Opened { result, .. })) =
            inputs.send(Input::Opened { generation, result }).await
        {
            tracing::debug!("session task went away while connecting");
            discard(result);
        }
    }

    async fn open(&self) -> Result<Connection, SessionError> {
        self.playback.prepare().await?;

        let microphone = self.microphone.clone();
        let capture_config = self.capture_config.clone();
        let sink = capture_sink(self.inputs.clone(), self.generation);
        let pipeline = tokio::task::spawn_blocking(move || {
            CapturePipeline::start(microphone.as_ref(), &capture_config, sink)
        })
        .await
        .map_err(SessionError::device)??;
        CaptureSlot::fill(&self.capture, pipeline);

        let connect = self.connector.connect(&self.config, &self.agent_id);
        match tokio::time::timeout(self.config.connect_timeout(), connect).await {
            Ok(connected) => connected,
            Err(_) => Err(SessionError::Transport(format!(
                "timed out after {:?} connecting to {}",
                self.config.connect_timeout(),
                self.config.base_url()
            ))),
        }
    }
}

/// Closes a connection nobody is going to use.
fn discard(result: Result<Connection, SessionError>) {
    if let Ok(connection) = result {
        connection.split().0.close();
    }
}

/// Frames go to the session tagged with their generation. Holds no strong
/// sender, so a live microphone never keeps the session task alive.
fn capture_sink(inputs: mpsc::WeakSender<Input>, generation: u64) -> FrameSink {
    Box::new(move |frame| {
        let Some(tx) = inputs.upgrade() else {
            return;
        };
        if let Err(e) = tx.try_send(Input::Captured { generation, frame }) {
            tracing::warn!("dropping captured audio frame: {}", e);
        }
    })
}

/// The session state machine.
///
/// Owns every sub-resource of the active session and is only ever driven
/// from one task, so status, transcript and the dedup set need no locking.
pub(crate) struct Session {
    config: Config,
    connector: Arc<dyn Connector>,
    microphone: Arc<dyn Microphone>,
    capture_config: CaptureConfig,
    playback: PlaybackScheduler,
    telephony: Arc<dyn Telephony>,
    events: EventSink,
    inputs: mpsc::WeakSender<Input>,
    status: watch::Sender<Status>,
    updates: broadcast::Sender<SessionUpdate>,
    transcript: Transcript,
    triggered: HashSet<EntryId>,
    active: Option<ActiveSession>,
    generation: u64,
}

impl Session {
    pub fn new(parts: SessionParts, inputs: mpsc::WeakSender<Input>) -> Self {
        let (status, _) = watch::channel(Status::Disconnected);
        let (updates, _) = broadcast::channel(UPDATES_CAPACITY);
        Self {
            config: parts.config,
            connector: parts.connector,
            microphone: parts.microphone,
            capture_config: parts.capture_config,
            playback: PlaybackScheduler::new(parts.speaker),
            telephony: parts.telephony,
            events: EventSink::new(parts.logger),
            inputs,
            status,
            updates,
            transcript: Transcript::new(),
            triggered: HashSet::new(),
            active: None,
            generation: 0,
        }
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    pub fn updates(&self) -> broadcast::Sender<SessionUpdate> {
        self.updates.clone()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn handle(&mut self, input: Input) {
        match input {
            Input::Start(reply) => self.start(reply),
            Input::Stop(reply) => {
                self.stop();
                let _ = reply.send(());
            }
            Input::SendText(text) => self.send_user_text(&text),
            Input::Snapshot(reply) => {
                let _ = reply.send(self.transcript.entries().to_vec());
            }
            Input::Opened { generation, result } => self.handle_opened(generation, result),
            Input::Transport { generation, event } => self.handle_transport(generation, event),
            Input::Captured { generation, frame } => self.handle_frame(generation, frame),
            Input::CallFinished { generation, update } => {
                if generation == self.generation {
                    self.notify(update);
                } else {
                    tracing::debug!("dropping call result from an earlier session: {:?}", update);
                }
            }
        }
    }

    /// Begins a session. `reply` resolves once the handshake is sent, or
    /// with the error that ended the attempt.
    pub fn start(&mut self, reply: StartReply) {
        if let Err(e) = self.begin() {
            if reply.send(Err(e)).is_err() {
                tracing::debug!("start caller went away before the result");
            }
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.pending_start = Some(reply);
        }
    }

    fn begin(&mut self) -> Result<(), SessionError> {
        if self.active.is_some() || self.status() != Status::Disconnected {
            return Err(SessionError::AlreadyActive);
        }
        let agent_id = self.config.validate()?.to_string();

        self.generation += 1;
        let generation = self.generation;
        let session_id = uuid::Uuid::new_v4().to_string();
        self.transcript = Transcript::new();
        self.triggered.clear();
        tracing::info!("starting session {}", session_id);

        let capture = Arc::new(Mutex::new(CaptureSlot::default()));
        let opening = Opening {
            generation,
            agent_id: agent_id.clone(),
            config: self.config.clone(),
            connector: self.connector.clone(),
            microphone: self.microphone.clone(),
            capture_config: self.capture_config.clone(),
            playback: self.playback.clone(),
            capture: capture.clone(),
            inputs: self.inputs.clone(),
        };
        self.active = Some(ActiveSession {
            id: session_id,
            generation,
            agent_id,
            audio_rate: PCM_SAMPLE_RATE,
            transport: None,
            capture,
            opening: Some(tokio::spawn(opening.run())),
            pending_start: None,
        });
        self.set_status(Status::Connecting);
        Ok(())
    }

    fn handle_opened(&mut self, generation: u64, result: Result<Connection, SessionError>) {
        let reply = match self.active.as_mut() {
            Some(active) if active.generation == generation => {
                active.opening = None;
                active.pending_start.take()
            }
            _ => {
                tracing::debug!("discarding a connection for an ended session");
                discard(result);
                return;
            }
        };

        let result = result.and_then(|connection| self.handshake(generation, connection));
        if let Err(e) = &result {
            self.fail(e);
        }
        if let Some(reply) = reply {
            if reply.send(result).is_err() {
                tracing::debug!("start caller went away before the result");
            }
        }
    }

    fn handshake(&mut self, generation: u64, connection: Connection) -> Result<(), SessionError> {
        let (mut transport, mut inbound) = connection.split();
        let inputs = self.inputs.clone();
        transport.track(tokio::spawn(async move {
            loop {
                let event = inbound.recv().await.unwrap_or(TransportEvent::Closed(None));
                let terminal = !matches!(event, TransportEvent::Message(_));
                let Some(tx) = inputs.upgrade() else {
                    break;
                };
                if tx.send(Input::Transport { generation, event }).await.is_err() || terminal {
                    break;
                }
            }
        }));

        let Some(active) = self.active.as_mut() else {
            transport.close();
            return Err(SessionError::Transport("session ended while connecting".to_string()));
        };
        let init = ClientEvent::SessionInit(SessionInitEvent::new(&active.agent_id));
        if let Err(e) = transport.send(init) {
            transport.close();
            return Err(e);
        }
        active.transport = Some(transport);
        let session_id = active.id.clone();
        let agent_id = active.agent_id.clone();

        self.set_status(Status::Connected);
        self.events.emit(
            EventKind::SessionStarted,
            &session_id,
            Some(json!({ "agentId": agent_id })),
        );
        Ok(())
    }

    /// Tears the session down. Safe to call from any state, any number of times.
    pub fn stop(&mut self) {
        if self.active.is_none() && self.status() == Status::Disconnected {
            tracing::debug!("stop requested while already disconnected");
            return;
        }
        self.teardown("stopped");
    }

    fn fail(&mut self, error: &SessionError) {
        tracing::error!("session failed: {}", error);
        if let Some(active) = &self.active {
            self.events.emit(
                EventKind::Error,
                &active.id,
                Some(json!({ "message": error.to_string() })),
            );
        }
        self.teardown("failed");
    }

    /// Releases capture, playback and transport in one place, whichever of
    /// them caused the teardown. A connect still in flight is abandoned.
    fn teardown(&mut self, reason: &str) {
        if let Some(mut active) = self.active.take() {
            if let Some(opening) = active.opening.take() {
                opening.abort();
            }
            CaptureSlot::release(&active.capture);
            self.playback.reset();
            if let Some(transport) = active.transport.take() {
                transport.close();
            }
            if let Some(reply) = active.pending_start.take() {
                let _ = reply.send(Err(SessionError::Transport(format!(
                    "session {} before the connection opened",
                    reason
                ))));
            }
            tracing::info!("session {} ended ({})", active.id, reason);
            self.events.emit(
                EventKind::SessionEnded,
                &active.id,
                Some(json!({ "reason": reason })),
            );
        } else {
            self.playback.reset();
        }
        self.set_status(Status::Disconnected);
    }

    fn current(&self, generation: u64) -> Option<&ActiveSession> {
        self.active
            .as_ref()
            .filter(|active| active.generation == generation)
    }

    fn set_status(&mut self, status: Status) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::info!("status: {} -> {}", previous, status);
            self.notify(SessionUpdate::StatusChanged(status));
        }
    }

    fn notify(&self, update: SessionUpdate) {
        // no subscribers is fine
        let _ = self.updates.send(update);
    }

    fn send(&self, event: ClientEvent) -> Result<(), SessionError> {
        match self.active.as_ref().and_then(|active| active.transport.as_ref()) {
            Some(transport) => transport.send(event),
            None => Err(SessionError::Transport("no open transport".to_string())),
        }
    }

    pub fn send_user_text(&mut self, text: &str) {
        if !self.status().is_open() {
            tracing::warn!("cannot send text while {}: no open transport", self.status());
            return;
        }
        if let Err(e) = self.send(ClientEvent::UserMessage(UserMessageEvent::new(text))) {
            tracing::warn!("failed to send user text: {}", e);
            return;
        }
        self.append(Role::User, text);
    }

    fn handle_frame(&mut self, generation: u64, frame: AudioFrame) {
        if self.current(generation).is_none() || !self.status().is_open() {
            tracing::trace!("discarding captured frame outside an open session");
            return;
        }
        let audio = codec::encode_pcm16(frame.samples());
        if let Err(e) = self.send(ClientEvent::UserAudioChunk(UserAudioChunkEvent::new(audio))) {
            tracing::warn!("failed to send captured audio: {}", e);
        }
    }

    fn handle_transport(&mut self, generation: u64, event: TransportEvent) {
        if self.current(generation).is_none() {
            tracing::debug!("ignoring transport event from an ended session");
            return;
        }
        match event {
            TransportEvent::Message(message) => self.handle_server_event(message),
            TransportEvent::Error(e) => {
                self.fail(&SessionError::Transport(e));
            }
            TransportEvent::Closed(reason) => {
                tracing::info!(
                    "remote closed the connection: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.teardown("closed by remote");
            }
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionReady(ready) => {
                tracing::info!(
                    "session ready, conversation {}",
                    ready.conversation_id().unwrap_or("unknown")
                );
                if let (Some(format), Some(active)) = (ready.audio_format(), self.active.as_mut()) {
                    match format.sample_rate() {
                        Some(rate) => {
                            if rate != PCM_SAMPLE_RATE {
                                tracing::info!("agent audio arrives at {}hz", rate);
                            }
                            active.audio_rate = rate;
                        }
                        None => tracing::warn!(
                            "unsupported agent audio format {:?}, playing it as {}hz PCM",
                            format,
                            active.audio_rate
                        ),
                    }
                }
                if self.status() == Status::Connected {
                    self.set_status(Status::Listening);
                }
            }
            ServerEvent::UserTranscript(transcript) => {
                self.append(Role::User, transcript.text());
            }
            ServerEvent::AgentResponse(response) => {
                let entry = self.append(Role::Assistant, response.text());
                if self.status().is_open() {
                    self.set_status(Status::Speaking);
                }
                self.process_directive(&entry);
            }
            ServerEvent::Audio(audio) => match codec::decode_pcm16(audio.audio()) {
                Ok(samples) => {
                    let rate = self
                        .active
                        .as_ref()
                        .map_or(PCM_SAMPLE_RATE, |active| active.audio_rate);
                    self.playback.enqueue(AudioFrame::new(samples, rate));
                }
                Err(e) => {
                    let e = SessionError::Protocol(format!("bad audio payload: {:#}", e));
                    tracing::warn!("{}", e);
                }
            },
            ServerEvent::AudioEnd => {
                if self.status() == Status::Speaking {
                    self.set_status(Status::Listening);
                }
            }
            ServerEvent::Interruption(interruption) => {
                let dropped = self.playback.flush();
                tracing::debug!(
                    "interrupted ({}), dropped {} segments",
                    interruption.reason().unwrap_or("user speech"),
                    dropped
                );
                if matches!(self.status(), Status::Listening | Status::Speaking) {
                    self.set_status(Status::Listening);
                }
            }
            ServerEvent::Ping(ping) => {
                if let Err(e) = self.send(ClientEvent::Pong(PongEvent::new(ping.event_id()))) {
                    tracing::warn!("failed to answer ping: {}", e);
                }
            }
            ServerEvent::Error(error) => {
                tracing::error!(
                    "remote error{}: {}",
                    error.code().map(|c| format!(" ({})", c)).unwrap_or_default(),
                    error.message()
                );
                if let Some(active) = &self.active {
                    self.events.emit(
                        EventKind::Error,
                        &active.id,
                        Some(json!({ "message": error.message(), "code": error.code() })),
                    );
                }
            }
            ServerEvent::Unknown => {}
        }
    }

    fn append(&mut self, role: Role, text: &str) -> TranscriptEntry {
        let entry = self.transcript.append(role, text).clone();
        if let Some(active) = &self.active {
            let kind = match role {
                Role::User => EventKind::UserMessage,
                Role::Assistant => EventKind::AssistantMessage,
            };
            self.events.emit(
                kind,
                &active.id,
                Some(json!({ "entryId": entry.id().to_string(), "text": entry.text() })),
            );
        }
        self.notify(SessionUpdate::TranscriptAppended(entry.clone()));
        entry
    }

    /// Runs the side effects an assistant entry asks for, at most once per entry.
    pub fn process_directive(&mut self, entry: &TranscriptEntry) {
        if entry.role() != Role::Assistant {
            return;
        }
        let Some(session_id) = self.active.as_ref().map(|active| active.id.clone()) else {
            return;
        };
        if !directive::parse(entry.text()).trigger_contact() {
            return;
        }
        if !self.triggered.insert(entry.id()) {
            tracing::debug!("contact already triggered for {}", entry.id());
            return;
        }

        let entry_id = entry.id();
        let summary = self.transcript.summary(SUMMARY_ENTRIES);
        tracing::warn!("{} requested an emergency contact call", entry_id);
        self.events.emit(
            EventKind::EmergencyCallTriggered,
            &session_id,
            Some(json!({ "entryId": entry_id.to_string() })),
        );

        let telephony = self.telephony.clone();
        let events = self.events.clone();
        let inputs = self.inputs.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let update = match telephony.trigger_call(&summary).await {
                Ok(outcome) if outcome.success() => {
                    tracing::info!("emergency call placed: {:?}", outcome.call_id());
                    events.emit(
                        EventKind::EmergencyCallCompleted,
                        &session_id,
                        Some(json!({ "entryId": entry_id.to_string(), "callId": outcome.call_id() })),
                    );
                    SessionUpdate::CallPlaced {
                        entry_id,
                        call_id: outcome.call_id().map(str::to_string),
                    }
                }
                result => {
                    let reason = match result {
                        Err(e) => format!("{:#}", e),
                        Ok(_) => "telephony service rejected the call".to_string(),
                    };
                    let e = SessionError::SideEffect(reason.clone());
                    tracing::error!("{}", e);
                    events.emit(
                        EventKind::EmergencyCallFailed,
                        &session_id,
                        Some(json!({ "entryId": entry_id.to_string(), "error": reason })),
                    );
                    SessionUpdate::CallFailed { entry_id, reason }
                }
            };
            // routed back through the session, which drops it if a newer session began
            if let Some(tx) = inputs.upgrade() {
                let _ = tx.send(Input::CallFinished { generation, update }).await;
            }
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.teardown("dropped");
        }
    }
}
