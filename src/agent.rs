use crate::capture::{CaptureConfig, Microphone};
use crate::client::{Config, Connector, WebSocketConnector};
use crate::error::SessionError;
use crate::event_log::{EventLogger, TracingEventLogger};
use crate::playback::Speaker;
use crate::session::{Input, Session, SessionParts, SessionUpdate};
use crate::telephony::{DisabledTelephony, Telephony};
use crate::types::{Status, TranscriptEntry};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

pub type UpdateRx = broadcast::Receiver<SessionUpdate>;

/// Handle to a voice session running on its own task.
///
/// Clones share the same session. The task ends, releasing every device,
/// once the last handle is dropped.
#[derive(Clone)]
pub struct VoiceAgent {
    inputs: mpsc::Sender<Input>,
    status: watch::Receiver<Status>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl VoiceAgent {
    pub fn builder(
        config: Config,
        microphone: Arc<dyn Microphone>,
        speaker: Arc<dyn Speaker>,
    ) -> VoiceAgentBuilder {
        VoiceAgentBuilder::new(config, microphone, speaker)
    }

    fn spawn(parts: SessionParts) -> Self {
        let (tx, mut rx) = mpsc::channel(parts.config.channel_capacity());
        let mut session = Session::new(parts, tx.downgrade());
        let status = session.watch_status();
        let updates = session.updates();

        tokio::spawn(async move {
            while let Some(input) = rx.recv().await {
                session.handle(input);
            }
            session.stop();
            tracing::debug!("voice session task finished");
        });

        Self {
            inputs: tx,
            status,
            updates,
        }
    }

    async fn request<T>(
        &self,
        input: impl FnOnce(oneshot::Sender<T>) -> Input,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.inputs
            .send(input(tx))
            .await
            .map_err(|_| SessionError::Transport("session task has stopped".to_string()))?;
        rx.await
            .map_err(|_| SessionError::Transport("session task dropped the request".to_string()))
    }

    /// Opens devices and the connection. Resolves once the handshake is sent,
    /// or with an error if the attempt fails or `stop` cuts it short.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.request(Input::Start).await?
    }

    /// Ends the session. Does nothing if none is open.
    pub async fn stop(&self) {
        if let Err(e) = self.request(Input::Stop).await {
            tracing::debug!("stop: {}", e);
        }
    }

    /// Sends a typed user message. Logged and dropped if no session is open.
    pub async fn send_user_text(&self, text: &str) {
        if self.inputs.send(Input::SendText(text.to_string())).await.is_err() {
            tracing::warn!("cannot send text: session task has stopped");
        }
    }

    /// Entries of the current, or most recently ended, session.
    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.request(Input::Snapshot).await.unwrap_or_default()
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> UpdateRx {
        self.updates.subscribe()
    }
}

pub struct VoiceAgentBuilder {
    parts: SessionParts,
}

impl VoiceAgentBuilder {
    /// Connects over a websocket, places no calls and logs events through
    /// `tracing` unless told otherwise.
    pub fn new(config: Config, microphone: Arc<dyn Microphone>, speaker: Arc<dyn Speaker>) -> Self {
        Self {
            parts: SessionParts {
                config,
                connector: Arc::new(WebSocketConnector),
                microphone,
                capture_config: CaptureConfig::default(),
                speaker,
                telephony: Arc::new(DisabledTelephony),
                logger: Arc::new(TracingEventLogger),
            },
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.parts.connector = connector;
        self
    }

    pub fn with_capture_config(mut self, capture_config: CaptureConfig) -> Self {
        self.parts.capture_config = capture_config;
        self
    }

    pub fn with_telephony(mut self, telephony: Arc<dyn Telephony>) -> Self {
        self.parts.telephony = telephony;
        self
    }

    pub fn with_event_logger(mut self, logger: Arc<dyn EventLogger>) -> Self {
        self.parts.logger = logger;
        self
    }

    /// Spawns the session task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> VoiceAgent {
        VoiceAgent::spawn(self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telephony::{CallOutcome, MockTelephony};
    use crate::testing::{FakeConnector, FakeMicrophone, FakeSpeaker};
    use crate::types::events::client::UserMessageEvent;
    use crate::types::events::server::{AgentResponseEvent, SessionReadyEvent};
    use crate::types::{ClientEvent, Role, ServerEvent};
    use std::time::{Duration, Instant};

    fn agent(connector: Arc<FakeConnector>, microphone: Arc<FakeMicrophone>) -> VoiceAgent {
        VoiceAgent::builder(
            Config::builder().with_agent_id("agent_1").build(),
            microphone,
            FakeSpeaker::new(Duration::from_millis(1)),
        )
        .with_connector(connector)
        .spawn()
    }

    async fn wait_for(status: &mut watch::Receiver<Status>, wanted: Status) {
        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| *s == wanted))
            .await
            .expect("timed out waiting for status")
            .expect("session task stopped");
    }

    #[tokio::test]
    async fn full_session_through_the_handle() {
        let connector = FakeConnector::new();
        let microphone = FakeMicrophone::new();
        let agent = agent(connector.clone(), microphone.clone());
        let mut status = agent.watch_status();

        agent.start().await.unwrap();
        assert_eq!(agent.status(), Status::Connected);
        let mut remote = connector.take_remote();
        assert!(matches!(remote.next().await, ClientEvent::SessionInit(_)));

        remote
            .send(ServerEvent::SessionReady(SessionReadyEvent::new()))
            .await;
        wait_for(&mut status, Status::Listening).await;

        agent.send_user_text("my father fainted").await;
        assert_eq!(
            remote.next().await,
            ClientEvent::UserMessage(UserMessageEvent::new("my father fainted"))
        );

        remote
            .send(ServerEvent::AgentResponse(AgentResponseEvent::new(
                "Check his breathing.",
            )))
            .await;
        wait_for(&mut status, Status::Speaking).await;

        let transcript = agent.transcript().await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role(), Role::User);
        assert_eq!(transcript[1].text(), "Check his breathing.");

        agent.stop().await;
        assert_eq!(agent.status(), Status::Disconnected);
        assert_eq!(microphone.open_streams(), 0);
        agent.stop().await;
        assert_eq!(agent.transcript().await.len(), 2);
    }

    #[tokio::test]
    async fn start_errors_reach_the_caller() {
        let agent = VoiceAgent::builder(
            Config::builder().build(),
            FakeMicrophone::new(),
            FakeSpeaker::new(Duration::ZERO),
        )
        .with_connector(FakeConnector::new())
        .spawn();

        assert!(matches!(
            agent.start().await,
            Err(SessionError::Configuration(_))
        ));
        assert_eq!(agent.status(), Status::Disconnected);
    }

    #[tokio::test]
    async fn remote_close_is_observed_by_watchers() {
        let connector = FakeConnector::new();
        let agent = agent(connector.clone(), FakeMicrophone::new());
        let mut status = agent.watch_status();

        agent.start().await.unwrap();
        let remote = connector.take_remote();
        remote.close("conversation ended").await;
        wait_for(&mut status, Status::Disconnected).await;

        // re-enterable
        agent.start().await.unwrap();
        assert_eq!(agent.status(), Status::Connected);
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn call_updates_are_broadcast() {
        let connector = FakeConnector::new();
        let mut telephony = MockTelephony::new();
        telephony
            .expect_trigger_call()
            .times(1)
            .returning(|_| Ok(CallOutcome::placed("CA9")));
        let agent = VoiceAgent::builder(
            Config::builder().with_agent_id("agent_1").build(),
            FakeMicrophone::new(),
            FakeSpeaker::new(Duration::ZERO),
        )
        .with_connector(connector.clone())
        .with_telephony(Arc::new(telephony))
        .spawn();
        let mut updates = agent.subscribe();

        agent.start().await.unwrap();
        let remote = connector.take_remote();
        remote
            .send(ServerEvent::AgentResponse(AgentResponseEvent::new(
                "[[CALL_EMERGENCY_CONTACT]]Calling your daughter.",
            )))
            .await;

        loop {
            let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
                .await
                .expect("timed out waiting for the call")
                .unwrap();
            if let SessionUpdate::CallPlaced { call_id, .. } = update {
                assert_eq!(call_id.as_deref(), Some("CA9"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn dropping_the_last_handle_releases_the_session() {
        let connector = FakeConnector::new();
        let microphone = FakeMicrophone::new();
        let agent = agent(connector.clone(), microphone.clone());
        let mut status = agent.watch_status();

        agent.start().await.unwrap();
        let mut remote = connector.take_remote();
        assert!(matches!(remote.next().await, ClientEvent::SessionInit(_)));
        assert_eq!(microphone.open_streams(), 1);

        drop(agent);
        wait_for(&mut status, Status::Disconnected).await;
        assert_eq!(microphone.open_streams(), 0);
        assert!(remote.is_closed_by_client().await);
    }

    #[tokio::test]
    async fn stop_cuts_a_slow_connect_short() {
        let connector = FakeConnector::slow(Duration::from_secs(1));
        let agent = agent(connector.clone(), FakeMicrophone::new());
        let mut status = agent.watch_status();

        let starting = agent.clone();
        let start = tokio::spawn(async move { starting.start().await });
        wait_for(&mut status, Status::Connecting).await;
        connector.wait_for_connects(1).await;

        let asked = Instant::now();
        agent.stop().await;
        assert!(asked.elapsed() < Duration::from_millis(200), "stop took {:?}", asked.elapsed());
        assert_eq!(agent.status(), Status::Disconnected);
        assert!(matches!(start.await.unwrap(), Err(SessionError::Transport(_))));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(connector.opened(), 0, "no handshake after stop");
        assert_eq!(agent.status(), Status::Disconnected);
    }
}
