use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use voice_session::directive;
use voice_session::event_log::{EventLogger, TracingEventLogger, WebhookEventLogger};
use voice_session::native::{CpalMicrophone, CpalSpeaker};
use voice_session::telephony::{DisabledTelephony, HttpTelephony, Telephony};
use voice_session::types::Role;
use voice_session::{Config, SessionUpdate, VoiceAgent};

const TELEPHONY_URL: &str = "TELEPHONY_URL";
const EVENT_WEBHOOK_URL: &str = "EVENT_WEBHOOK_URL";

/// Talk to a voice agent through the default microphone and speakers.
/// Lines typed on stdin are sent as text messages.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Input device name (see the `devices` example)
    #[arg(long)]
    input: Option<String>,
    /// Output device name
    #[arg(long)]
    output: Option<String>,
    /// Overrides VOICE_AGENT_ID
    #[arg(long)]
    agent_id: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv_override().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,voice_session=debug")),
        )
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let mut config = Config::new();
    if let Some(agent_id) = &args.agent_id {
        config = Config::builder()
            .with_base_url(config.base_url())
            .with_agent_id(agent_id)
            .build();
    }

    let telephony: Arc<dyn Telephony> = match std::env::var(TELEPHONY_URL) {
        Ok(url) => Arc::new(HttpTelephony::new(&url)),
        Err(_) => Arc::new(DisabledTelephony),
    };
    let logger: Arc<dyn EventLogger> = match std::env::var(EVENT_WEBHOOK_URL) {
        Ok(url) => Arc::new(WebhookEventLogger::new(&url)),
        Err(_) => Arc::new(TracingEventLogger),
    };

    let agent = VoiceAgent::builder(
        config,
        Arc::new(CpalMicrophone::new(args.input.as_deref())),
        Arc::new(CpalSpeaker::new(args.output.as_deref())),
    )
    .with_telephony(telephony)
    .with_event_logger(logger)
    .spawn();

    let mut updates = agent.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                SessionUpdate::StatusChanged(status) => println!("[{}]", status),
                SessionUpdate::TranscriptAppended(entry) => match entry.role() {
                    Role::User => println!("You: {}", entry.text()),
                    Role::Assistant => {
                        let parsed = directive::parse(entry.text());
                        println!("Agent: {}", parsed.display_text());
                        for link in parsed.resources() {
                            println!("  - {}: {}", link.label(), link.description());
                        }
                    }
                },
                SessionUpdate::CallPlaced { call_id, .. } => {
                    println!("Emergency contact is being called ({})", call_id.unwrap_or_default())
                }
                SessionUpdate::CallFailed { reason, .. } => {
                    println!("Could not call emergency contact: {}", reason)
                }
            }
        }
    });

    if let Err(e) = agent.start().await {
        eprintln!("Failed to start session: {}", e);
        return;
    }

    let text_agent = agent.clone();
    let stdin = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if !line.is_empty() {
                text_agent.send_user_text(line).await;
            }
        }
    });

    let mut status = agent.watch_status();
    tokio::select! {
        _ = status.wait_for(|s| *s == voice_session::types::Status::Disconnected) => {
            println!("Session ended by the remote");
        },
        _ = printer => {},
        _ = stdin => {},
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl-C, shutting down...");
        }
    }
    agent.stop().await;
    println!("Shutting down...");
}
