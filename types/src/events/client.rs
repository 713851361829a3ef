use crate::audio::{AudioFormat, Base64EncodedAudioBytes, PCM_SAMPLE_RATE};

/// `session_init` event, sent once right after the transport opens.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionInitEvent {
    /// Remote agent this conversation is addressed to
    agent_id: String,

    /// Sample rate of the audio this client streams
    sample_rate: u32,

    audio_format: AudioFormat,
}

impl SessionInitEvent {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            sample_rate: PCM_SAMPLE_RATE,
            audio_format: AudioFormat::Pcm16000,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn audio_format(&self) -> &AudioFormat {
        &self.audio_format
    }
}

/// `user_audio_chunk` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserAudioChunkEvent {
    audio: Base64EncodedAudioBytes,
}

impl UserAudioChunkEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self { audio }
    }

    pub fn audio(&self) -> &str {
        &self.audio
    }
}

/// `user_message` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserMessageEvent {
    text: String,
}

impl UserMessageEvent {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `pong` event, the reply to every `ping`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PongEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_id: Option<u64>,
}

impl PongEvent {
    pub fn new(event_id: Option<u64>) -> Self {
        Self { event_id }
    }

    pub fn event_id(&self) -> Option<u64> {
        self.event_id
    }
}
