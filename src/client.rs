use crate::error::SessionError;
use crate::types;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

mod config;
mod consts;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use utils::build_request;

pub type ClientTx = mpsc::Sender<types::ClientEvent>;
pub type TransportRx = mpsc::Receiver<TransportEvent>;

/// What the transport reader reports, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(types::ServerEvent),
    /// The connection failed after it was open.
    Error(String),
    /// The remote closed the connection.
    Closed(Option<String>),
}

/// An open bidirectional connection: an outbound sender, an inbound
/// receiver, and the tasks pumping them.
pub struct Connection {
    outbound: ClientTx,
    inbound: TransportRx,
    writer: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    pub fn new(outbound: ClientTx, inbound: TransportRx) -> Self {
        Self {
            outbound,
            inbound,
            writer: None,
            tasks: Vec::new(),
        }
    }

    /// Task draining the outbound sender. It is left to finish on close.
    pub fn with_writer(mut self, task: JoinHandle<()>) -> Self {
        self.writer = Some(task);
        self
    }

    /// Any other task tied to the connection. Aborted on close.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }

    pub(crate) fn split(self) -> (Transport, TransportRx) {
        (
            Transport {
                outbound: self.outbound,
                writer: self.writer,
                tasks: self.tasks,
            },
            self.inbound,
        )
    }
}

/// Sending half of a connection, owned by the active session.
pub struct Transport {
    outbound: ClientTx,
    writer: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Transport {
    /// Queues an event for the writer without waiting.
    pub fn send(&self, event: types::ClientEvent) -> Result<(), SessionError> {
        let kind = event.kind();
        self.outbound.try_send(event).map_err(|e| {
            SessionError::Transport(format!("failed to queue {}: {}", kind, e))
        })
    }

    pub(crate) fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Closes the connection. The writer drains, sends a close frame and
    /// exits once the sender is dropped; every other task is aborted.
    pub fn close(self) {
        let Transport {
            outbound,
            writer,
            tasks,
        } = self;
        drop(outbound);
        drop(writer);
        for task in tasks {
            task.abort();
        }
    }
}

/// Opens connections to the remote voice service.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &Config, agent_id: &str) -> Result<Connection, SessionError>;
}

/// Connects over a websocket using `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &Config, agent_id: &str) -> Result<Connection, SessionError> {
        let request = build_request(config, agent_id).map_err(SessionError::transport)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(SessionError::transport)?;
        tracing::info!("connected to {}", config.base_url());

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = mpsc::channel::<types::ClientEvent>(config.channel_capacity());
        let (s_tx, s_rx) = mpsc::channel::<TransportEvent>(config.channel_capacity());

        let send_handle = tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close websocket: {}", e);
            }
        });

        let recv_handle = tokio::spawn(async move {
            let mut terminal = TransportEvent::Closed(None);
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        terminal = TransportEvent::Error(e.to_string());
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match decode_server_event(&text) {
                        Ok(event) => {
                            if s_tx.send(TransportEvent::Message(event)).await.is_err() {
                                tracing::debug!("session dropped its receiver, stopping reader");
                                return;
                            }
                        }
                        Err(e) => tracing::error!("{}", e),
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        terminal = TransportEvent::Closed(reason.map(|v| v.reason.to_string()));
                        break;
                    }
                    _ => {}
                }
            }
            if let Err(e) = s_tx.send(terminal).await {
                tracing::debug!("failed to report transport end: {}", e);
            }
        });

        Ok(Connection::new(c_tx, s_rx)
            .with_writer(send_handle)
            .with_task(recv_handle))
    }
}

/// Parses one inbound text frame.
///
/// Unrecognized `type`s parse to `ServerEvent::Unknown` and are logged here
/// with their raw name; malformed frames are a `ProtocolError`.
pub fn decode_server_event(text: &str) -> Result<types::ServerEvent, SessionError> {
    let json = serde_json::from_str::<serde_json::Value>(text)
        .map_err(|e| SessionError::Protocol(format!("malformed message: {}, text=> {:?}", e, text)))?;
    let event_type = json.get("type").and_then(|v| v.as_str());
    tracing::debug!("received message: {}", event_type.unwrap_or("unknown"));

    let event = serde_json::from_value::<types::ServerEvent>(json.clone()).map_err(|e| {
        SessionError::Protocol(format!("failed to deserialize event: {}, type=> {:?}", e, json))
    })?;
    if let types::ServerEvent::Unknown = event {
        tracing::warn!("ignoring unrecognized message type: {}", event_type.unwrap_or("unknown"));
    }
    Ok(event)
}
