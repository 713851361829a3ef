use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;

/// Result of asking the telephony service to place a call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    success: bool,
    #[serde(default)]
    call_id: Option<String>,
}

impl CallOutcome {
    pub fn placed(call_id: &str) -> Self {
        Self {
            success: true,
            call_id: Some(call_id.to_string()),
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            call_id: None,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }
}

/// Places the outbound call to the user's emergency contact.
///
/// Implementations may be slow and may fail; the session only ever calls
/// this from a detached task.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Telephony: Send + Sync {
    async fn trigger_call(&self, summary: &str) -> Result<CallOutcome>;
}

/// Telephony backed by an HTTP endpoint accepting `{"summary": ...}`.
pub struct HttpTelephony {
    client: Client,
    url: String,
}

impl HttpTelephony {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Telephony for HttpTelephony {
    async fn trigger_call(&self, summary: &str) -> Result<CallOutcome> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "summary": summary }))
            .send()
            .await
            .context("Failed to reach telephony service")?
            .error_for_status()
            .context("Telephony service rejected the request")?;
        let outcome = response
            .json::<CallOutcome>()
            .await
            .context("Failed to parse telephony response")?;
        Ok(outcome)
    }
}

/// Used when no telephony endpoint is configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTelephony;

#[async_trait]
impl Telephony for DisabledTelephony {
    async fn trigger_call(&self, _summary: &str) -> Result<CallOutcome> {
        Err(anyhow::anyhow!("no telephony service configured"))
    }
}
