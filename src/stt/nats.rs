use futures::stream::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{load_recording, Transcriber, TranscriptionError};
use crate::nats::{NatsClient, TranscriptMessage};

/// Frames per published chunk; embedded targets choke on whole files
const CHUNK_FRAMES: usize = 1024;

/// Streams a recording to the STT service over NATS and waits for the
/// final transcript.
pub struct NatsTranscriber {
    client: Arc<NatsClient>,
    timeout: Duration,
}

impl NatsTranscriber {
    pub fn new(client: Arc<NatsClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait::async_trait]
impl Transcriber for NatsTranscriber {
    async fn transcribe(&self, artifact: &Path) -> Result<String, TranscriptionError> {
        let audio = load_recording(artifact)?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let backend = |e: anyhow::Error| TranscriptionError::Backend(format!("{:#}", e));

        // Subscribe before publishing so the final transcript cannot be missed
        let mut transcripts = self.client.subscribe_transcripts().await.map_err(backend)?;

        let pcm = audio.pcm_bytes();
        let chunk_bytes = CHUNK_FRAMES * 2;
        let mut sequence = 0u32;

        for chunk in pcm.chunks(chunk_bytes) {
            self.client
                .publish_audio_frame(&session_id, chunk, audio.sample_rate, 1, sequence, false)
                .await
                .map_err(backend)?;
            sequence += 1;
        }

        self.client
            .publish_audio_frame(&session_id, &[], audio.sample_rate, 1, sequence, true)
            .await
            .map_err(backend)?;

        info!(
            "Sent {} for recognition ({} frames, session {})",
            artifact.display(),
            sequence,
            session_id
        );

        let wait = async {
            while let Some(msg) = transcripts.next().await {
                match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) if transcript.session_id == session_id && !transcript.partial => {
                        return Some(transcript.text);
                    }
                    Ok(_) => continue,
                    Err(e) => warn!("Failed to parse transcript message: {}", e),
                }
            }
            None
        };

        let text = tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| TranscriptionError::Backend("timed out waiting for transcript".into()))?
            .ok_or_else(|| TranscriptionError::Backend("transcript subscription closed".into()))?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(TranscriptionError::NotRecognized);
        }

        Ok(text)
    }
}
