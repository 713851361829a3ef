pub const VOICE_AGENT_URL: &str = "VOICE_AGENT_URL";
pub const VOICE_AGENT_ID: &str = "VOICE_AGENT_ID";
pub const VOICE_AGENT_API_KEY: &str = "VOICE_AGENT_API_KEY";

pub const BASE_URL: &str = "wss://api.elevenlabs.io/v1/convai/conversation";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
