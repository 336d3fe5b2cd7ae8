use anyhow::{Context, Result};
use base64::Engine;
use futures::stream::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::file::AudioFile;
use crate::nats::AudioFrameMessage;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for audio backend
///
/// Backends deliver frames in the source format; conversion to the
/// recording format happens in the recorder.
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 100, // 100ms buffers
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - NATS: frames published by the platform audio daemon
/// - File: replay an audio file (for testing/batch processing)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone frames relayed over NATS by the audio daemon
    Nats {
        client: async_nats::Client,
        subject: String,
    },
    /// File input (for testing/batch processing)
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Nats { client, subject } => {
                Ok(Box::new(NatsBackend::new(client, subject)))
            }
            AudioSource::File(path) => Ok(Box::new(FileBackend::new(path, config))),
        }
    }
}

/// Replays a WAV file as a sequence of fixed-duration frames
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let audio = AudioFile::open(&self.path)?;
        let (tx, rx) = mpsc::channel(100);

        let frame_samples = (audio.sample_rate as u64 * self.config.buffer_duration_ms / 1000)
            .max(1) as usize
            * audio.channels as usize;
        let frame_ms = self.config.buffer_duration_ms;
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        info!("Replaying {} ({} samples)", audio.path, audio.samples.len());

        self.task = Some(tokio::spawn(async move {
            for (i, chunk) in audio.samples.chunks(frame_samples).enumerate() {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms: i as u64 * frame_ms,
                };

                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.await.context("File replay task panicked")?;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Receives microphone frames published on a NATS subject
pub struct NatsBackend {
    client: async_nats::Client,
    subject: String,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl NatsBackend {
    pub fn new(client: async_nats::Client, subject: String) -> Self {
        Self {
            client,
            subject,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for NatsBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let mut subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .context("Failed to subscribe to audio frames")?;

        info!("Capturing audio frames from {}", self.subject);

        let (tx, rx) = mpsc::channel(100);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        self.task = Some(tokio::spawn(async move {
            let mut elapsed_ms = 0u64;

            while let Some(msg) = subscriber.next().await {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = match decode_frame(&msg.payload, elapsed_ms) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Dropping malformed audio frame: {:#}", e);
                        continue;
                    }
                };

                let per_second = frame.sample_rate as u64 * frame.channels.max(1) as u64;
                if per_second > 0 {
                    elapsed_ms += frame.samples.len() as u64 * 1000 / per_second;
                }

                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            // The subscriber may be parked waiting for a message
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "nats"
    }
}

fn decode_frame(payload: &[u8], timestamp_ms: u64) -> Result<AudioFrame> {
    let message: AudioFrameMessage = serde_json::from_slice(payload)?;
    let pcm = base64::engine::general_purpose::STANDARD.decode(message.pcm.as_bytes())?;

    let samples = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    Ok(AudioFrame {
        samples,
        sample_rate: message.sample_rate,
        channels: message.channels,
        timestamp_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame() {
        let pcm: Vec<u8> = [1i16, -2, 300].iter().flat_map(|s| s.to_le_bytes()).collect();
        let message = AudioFrameMessage {
            session_id: "mic".to_string(),
            sequence: 3,
            pcm: base64::engine::general_purpose::STANDARD.encode(&pcm),
            sample_rate: 16000,
            channels: 1,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            final_frame: false,
        };
        let payload = serde_json::to_vec(&message).unwrap();

        let frame = decode_frame(&payload, 200).unwrap();
        assert_eq!(frame.samples, vec![1, -2, 300]);
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.timestamp_ms, 200);
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame(b"not json", 0).is_err());
    }
}
