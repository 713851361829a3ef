mod agent;
pub mod capture;
mod client;
pub mod directive;
mod error;
pub mod event_log;
#[cfg(feature = "native-audio")]
pub mod native;
pub mod playback;
mod session;
pub mod telephony;
pub mod transcript;

#[cfg(test)]
mod testing;

pub use voice_session_types as types;
pub use voice_session_utils as utils;

pub use agent::{UpdateRx, VoiceAgent, VoiceAgentBuilder};
pub use client::{
    build_request, decode_server_event, Config, ConfigBuilder, Connection, Connector,
    TransportEvent, WebSocketConnector,
};
pub use error::{Result, SessionError};
pub use session::{SessionUpdate, SUMMARY_ENTRIES};
