use chrono::Utc;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackendConfig, AudioBackendFactory, AudioSource};
use super::recorder::{RecordingSummary, WavRecorder};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Audio backend failed: {0:#}")]
    Backend(anyhow::Error),

    #[error("Failed to write recording: {0:#}")]
    Recording(anyhow::Error),

    #[error("Capture task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns a running capture. Stopping it (or dropping it) ends the recording
/// and finalises the artifact.
pub struct CaptureHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<RecordingSummary, CaptureError>>>,
}

impl CaptureHandle {
    /// Run a capture future. The future receives the stop signal and must
    /// return once it fires.
    pub fn spawn<F, Fut>(capture: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = Result<RecordingSummary, CaptureError>> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        Self {
            stop_tx: Some(stop_tx),
            task: Some(tokio::spawn(capture(stop_rx))),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the capture to stop and wait for the artifact to be written
    pub async fn finish(mut self) -> Result<RecordingSummary, CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Err means the capture already ended on its own
            let _ = stop_tx.send(());
        }

        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| CaptureError::Task(e.to_string()))?,
            None => Err(CaptureError::Task("capture already finished".to_string())),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            debug!("Capture handle dropped while recording, stopping capture");
            let _ = stop_tx.send(());
        }
    }
}

/// Capture collaborator: allocates a recorder and artifact path per session
#[async_trait::async_trait]
pub trait Capture: Send + Sync {
    /// Begin recording a new voice command
    async fn start_capture(&self) -> Result<(CaptureHandle, PathBuf), CaptureError>;

    /// Stop a recording started by [`Capture::start_capture`]
    async fn stop_capture(&self, handle: CaptureHandle) -> Result<(), CaptureError> {
        let summary = handle.finish().await?;
        info!(
            "Recording finished: {} ({} samples, {:.1}s)",
            summary.file_path.display(),
            summary.sample_count,
            summary.end_ms as f64 / 1000.0
        );
        Ok(())
    }
}

/// Configuration for [`WavCapture`]
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory receiving the WAV artifacts
    pub recordings_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub source: AudioSource,
}

/// Records voice commands from an [`AudioSource`] into WAV files
pub struct WavCapture {
    config: CaptureConfig,
}

impl WavCapture {
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        fs::create_dir_all(&config.recordings_path)?;
        Ok(Self { config })
    }

    fn artifact_path(&self) -> PathBuf {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.config
            .recordings_path
            .join(format!("{}-{}.wav", Utc::now().timestamp(), &suffix[..8]))
    }
}

#[async_trait::async_trait]
impl Capture for WavCapture {
    async fn start_capture(&self) -> Result<(CaptureHandle, PathBuf), CaptureError> {
        let path = self.artifact_path();
        let backend_config = AudioBackendConfig {
            buffer_duration_ms: 100,
        };

        let mut backend = AudioBackendFactory::create(self.config.source.clone(), backend_config)
            .map_err(CaptureError::Backend)?;
        let mut audio_rx = backend.start().await.map_err(CaptureError::Backend)?;
        let mut recorder = match WavRecorder::create(&path, self.config.sample_rate, self.config.channels) {
            Ok(recorder) => recorder,
            Err(e) => {
                drop(audio_rx);
                if let Err(stop_err) = backend.stop().await {
                    warn!("Failed to stop audio backend: {:#}", stop_err);
                }
                return Err(CaptureError::Recording(e));
            }
        };

        info!("Recording voice input to {} via {}", path.display(), backend.name());

        let handle = CaptureHandle::spawn(move |mut stop_rx| async move {
            let result = loop {
                tokio::select! {
                    _ = &mut stop_rx => break Ok(()),
                    frame = audio_rx.recv() => match frame {
                        Some(frame) => {
                            if let Err(e) = recorder.write_frame(frame) {
                                break Err(CaptureError::Recording(e));
                            }
                        }
                        None => break Ok(()),
                    },
                }
            };

            // Unblocks a backend waiting on a full channel
            drop(audio_rx);
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop audio backend: {:#}", e);
            }

            match result {
                Ok(()) => recorder.finish().map_err(CaptureError::Recording),
                Err(e) => {
                    error!("Voice recording failed: {}", e);
                    Err(e)
                }
            }
        });

        Ok((handle, path))
    }
}
