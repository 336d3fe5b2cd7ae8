use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Subject carrying final transcripts from the STT service
pub const FINAL_TRANSCRIPT_SUBJECT: &str = "stt.text.final";

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Underlying connection, shared with the audio backend
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Publish audio frame for a recognition session
    pub async fn publish_audio_frame(
        &self,
        session_id: &str,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("audio.frame.voice-{}", session_id);

        let message = super::messages::AudioFrameMessage {
            session_id: session_id.to_string(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client.publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (sequence={}, bytes={}, final={})",
            subject, sequence, pcm_bytes.len(), is_final
        );

        Ok(())
    }

    /// Subscribe to final transcript messages
    ///
    /// Transcripts for every session arrive on the same subject; callers
    /// filter by session_id in the payload.
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        let subscriber = self.client.subscribe(FINAL_TRANSCRIPT_SUBJECT)
            .await
            .context("Failed to subscribe to transcripts")?;

        debug!("Subscribed to {}", FINAL_TRANSCRIPT_SUBJECT);

        Ok(subscriber)
    }

    /// JSON request/reply with a deadline
    pub async fn request_json<Req, Resp>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request)?;

        let reply = tokio::time::timeout(
            timeout,
            self.client.request(subject.to_string(), payload.into()),
        )
        .await
        .with_context(|| format!("Request to {} timed out", subject))?
        .with_context(|| format!("Request to {} failed", subject))?;

        serde_json::from_slice(&reply.payload)
            .with_context(|| format!("Invalid reply from {}", subject))
    }
}
