pub mod client;
pub mod server;

use client::*;
use server::*;

/// Messages sent from this client to the remote voice service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session_init")]
    SessionInit(SessionInitEvent),
    #[serde(rename = "user_audio_chunk")]
    UserAudioChunk(UserAudioChunkEvent),
    #[serde(rename = "user_message")]
    UserMessage(UserMessageEvent),
    #[serde(rename = "pong")]
    Pong(PongEvent),
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionInit(_) => "session_init",
            ClientEvent::UserAudioChunk(_) => "user_audio_chunk",
            ClientEvent::UserMessage(_) => "user_message",
            ClientEvent::Pong(_) => "pong",
        }
    }
}

/// Messages received from the remote voice service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session_ready")]
    SessionReady(SessionReadyEvent),
    #[serde(rename = "user_transcript")]
    UserTranscript(UserTranscriptEvent),
    #[serde(rename = "agent_response")]
    AgentResponse(AgentResponseEvent),
    #[serde(rename = "audio")]
    Audio(AudioEvent),
    #[serde(rename = "audio_end")]
    AudioEnd,
    #[serde(rename = "interruption")]
    Interruption(InterruptionEvent),
    #[serde(rename = "ping")]
    Ping(PingEvent),
    #[serde(rename = "error")]
    Error(ErrorEvent),
    /// Any `type` this client does not understand.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionReady(_) => "session_ready",
            ServerEvent::UserTranscript(_) => "user_transcript",
            ServerEvent::AgentResponse(_) => "agent_response",
            ServerEvent::Audio(_) => "audio",
            ServerEvent::AudioEnd => "audio_end",
            ServerEvent::Interruption(_) => "interruption",
            ServerEvent::Ping(_) => "ping",
            ServerEvent::Error(_) => "error",
            ServerEvent::Unknown => "unknown",
        }
    }
}
