//! Text-only session: no audio devices, one typed message, prints what comes back.

use async_trait::async_trait;
use std::sync::Arc;
use voice_session::capture::{BlockCallback, CaptureConfig, CaptureStream, Microphone};
use voice_session::playback::{AudioOutput, Speaker};
use voice_session::types::AudioFrame;
use voice_session::{Config, SessionError, SessionUpdate, VoiceAgent};

struct Muted;

impl CaptureStream for Muted {
    fn close(self: Box<Self>) {}
}

impl Microphone for Muted {
    fn open(
        &self,
        _config: &CaptureConfig,
        _on_block: BlockCallback,
    ) -> Result<Box<dyn CaptureStream>, SessionError> {
        Ok(Box::new(Muted))
    }
}

#[async_trait]
impl AudioOutput for Muted {
    async fn play(&mut self, frame: AudioFrame) -> anyhow::Result<()> {
        tokio::time::sleep(frame.duration()).await;
        Ok(())
    }
}

impl Speaker for Muted {
    fn open(&self) -> Result<Box<dyn AudioOutput>, SessionError> {
        Ok(Box::new(Muted))
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv_override().ok();
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let agent = VoiceAgent::builder(Config::new(), Arc::new(Muted), Arc::new(Muted)).spawn();
    let mut updates = agent.subscribe();

    agent.start().await.expect("failed to start session");
    println!("Connected to voice agent");

    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            if let SessionUpdate::TranscriptAppended(entry) = update {
                println!("{}: {}", entry.role(), entry.text());
            }
        }
    });

    agent.send_user_text("Hello!").await;

    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    agent.stop().await;
}
