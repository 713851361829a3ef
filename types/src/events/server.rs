use crate::audio::{AudioFormat, Base64EncodedAudioBytes};

/// `session_ready` event
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionReadyEvent {
    /// Identifier the remote service assigned to this conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,

    /// Format of the audio the service will stream back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio_format: Option<AudioFormat>,
}

impl SessionReadyEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation_id(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }

    pub fn with_audio_format(mut self, audio_format: AudioFormat) -> Self {
        self.audio_format = Some(audio_format);
        self
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn audio_format(&self) -> Option<&AudioFormat> {
        self.audio_format.as_ref()
    }
}

/// `user_transcript` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserTranscriptEvent {
    /// Transcribed user speech
    text: String,
}

impl UserTranscriptEvent {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `agent_response` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentResponseEvent {
    /// Assistant text, possibly carrying control markers
    text: String,
}

impl AgentResponseEvent {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `audio` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioEvent {
    /// Base64 encoded little-endian PCM16
    audio: Base64EncodedAudioBytes,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_id: Option<u64>,
}

impl AudioEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self {
            audio,
            event_id: None,
        }
    }

    pub fn audio(&self) -> &str {
        &self.audio
    }

    pub fn event_id(&self) -> Option<u64> {
        self.event_id
    }
}

/// `interruption` event
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InterruptionEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl InterruptionEvent {
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// `ping` event
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PingEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_id: Option<u64>,

    /// Round trip the service measured for the previous probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ping_ms: Option<u64>,
}

impl PingEvent {
    pub fn new(event_id: Option<u64>) -> Self {
        Self {
            event_id,
            ping_ms: None,
        }
    }

    pub fn event_id(&self) -> Option<u64> {
        self.event_id
    }

    pub fn ping_ms(&self) -> Option<u64> {
        self.ping_ms
    }
}

/// `error` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorEvent {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}
