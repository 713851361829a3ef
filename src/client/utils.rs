use crate::client::config::Config;
use crate::client::consts::AUTHORIZATION_HEADER;
use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

/// Builds the websocket handshake request for `agent_id`.
pub fn build_request(config: &Config, agent_id: &str) -> tokio_tungstenite::tungstenite::Result<Request> {
    let separator = if config.base_url().contains('?') { '&' } else { '?' };
    let mut request = format!("{}{}agent_id={}", config.base_url(), separator, agent_id)
        .into_client_request()?;
    if let Some(api_key) = config.api_key() {
        request.headers_mut().insert(
            AUTHORIZATION_HEADER,
            format!("Bearer {}", api_key.expose_secret()).as_str().parse()?,
        );
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_agent_and_bearer_token() {
        let config = Config::builder()
            .with_base_url("wss://voice.example.com/v1/conversation")
            .with_agent_id("agent_7")
            .with_api_key("sk-secret")
            .build();
        let request = build_request(&config, "agent_7").unwrap();
        assert_eq!(
            request.uri().to_string(),
            "wss://voice.example.com/v1/conversation?agent_id=agent_7"
        );
        assert_eq!(
            request.headers().get(AUTHORIZATION_HEADER).unwrap(),
            "Bearer sk-secret"
        );
    }

    #[test]
    fn existing_query_is_extended() {
        let config = Config::builder()
            .with_base_url("wss://voice.example.com/ws?region=eu")
            .build();
        let request = build_request(&config, "a1").unwrap();
        assert_eq!(request.uri().query(), Some("region=eu&agent_id=a1"));
        assert!(request.headers().get(AUTHORIZATION_HEADER).is_none());
    }
}
