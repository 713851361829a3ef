use crate::client::consts::{
    BASE_URL, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT_SECS, VOICE_AGENT_API_KEY,
    VOICE_AGENT_ID, VOICE_AGENT_URL,
};
use crate::error::SessionError;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Connection settings for the remote voice service.
#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    agent_id: Option<String>,
    api_key: Option<SecretString>,
    connect_timeout: Duration,
    channel_capacity: usize,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Starts from an empty config: default URL, no identity, no key.
    pub fn new() -> Self {
        Self {
            config: Config {
                base_url: BASE_URL.to_string(),
                agent_id: None,
                api_key: None,
                connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            },
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_agent_id(mut self, agent_id: &str) -> Self {
        self.config.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Reads the service URL, agent id and API key from the environment,
    /// falling back to defaults for anything unset.
    pub fn new() -> Self {
        let mut builder = ConfigBuilder::new();
        if let Ok(url) = std::env::var(VOICE_AGENT_URL) {
            builder = builder.with_base_url(&url);
        }
        if let Ok(agent_id) = std::env::var(VOICE_AGENT_ID) {
            builder = builder.with_agent_id(&agent_id);
        }
        if let Ok(api_key) = std::env::var(VOICE_AGENT_API_KEY) {
            builder = builder.with_api_key(&api_key);
        }
        builder.build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Checks that the remote endpoint identity is present.
    ///
    /// Returns the agent id so callers do not have to unwrap it again.
    pub fn validate(&self) -> Result<&str, SessionError> {
        if self.base_url.trim().is_empty() {
            return Err(SessionError::Configuration("service URL is empty".to_string()));
        }
        match self.agent_id.as_deref().map(str::trim) {
            Some(agent_id) if !agent_id.is_empty() => {}
            _ => {
                return Err(SessionError::Configuration(format!(
                    "{} must be set to start a session",
                    VOICE_AGENT_ID
                )))
            }
        }
        if let Some(key) = &self.api_key {
            if key.expose_secret().trim().is_empty() {
                return Err(SessionError::Configuration("API key is empty".to_string()));
            }
        }
        Ok(self.agent_id.as_deref().unwrap_or_default().trim())
    }
}
