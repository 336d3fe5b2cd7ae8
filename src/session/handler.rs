use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::registry::{RecordingSession, SessionRegistry};
use crate::audio::{Capture, CaptureHandle};
use crate::mapper::IntentSlot;
use crate::nlu::{NluEngines, NluModel};
use crate::stt::Transcriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordMode {
    #[default]
    Manual,
    Auto,
}

/// One control message of a recognition stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizeControl {
    pub action: RecordAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    /// Engine selector, `"snips"` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlu_model: Option<String>,
    #[serde(default)]
    pub record_mode: RecordMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecognizeStatus {
    RecProcessing,
    RecSuccess,
    VoiceNotRecognized,
    IntentNotRecognized,
    NluModelNotSupported,
    SessionNotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizeResult {
    pub command: String,
    pub intent: String,
    pub intent_slots: Vec<IntentSlot>,
    pub stream_id: String,
    pub status: RecognizeStatus,
}

impl RecognizeResult {
    fn with_status(stream_id: impl Into<String>, status: RecognizeStatus) -> Self {
        Self {
            command: String::new(),
            intent: String::new(),
            intent_slots: Vec::new(),
            stream_id: stream_id.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub version: String,
    pub status: bool,
    pub wake_word: String,
}

impl ServiceStatus {
    pub fn new(wake_word: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: true,
            wake_word: wake_word.into(),
        }
    }
}

/// Deletes a recorded artifact when dropped, unless voice commands are kept
struct DisposeArtifact {
    path: PathBuf,
    keep: bool,
}

impl Drop for DisposeArtifact {
    fn drop(&mut self) {
        if self.keep {
            debug!("Keeping voice command {}", self.path.display());
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted voice command {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", self.path.display(), e),
        }
    }
}

/// Drives recording sessions from START/STOP control messages
pub struct SessionHandler {
    registry: SessionRegistry<CaptureHandle>,
    capture: Arc<dyn Capture>,
    transcriber: Arc<dyn Transcriber>,
    nlu: NluEngines,
    store_voice_commands: bool,
}

impl SessionHandler {
    pub fn new(
        capture: Arc<dyn Capture>,
        transcriber: Arc<dyn Transcriber>,
        nlu: NluEngines,
        store_voice_commands: bool,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            capture,
            transcriber,
            nlu,
            store_voice_commands,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<CaptureHandle> {
        &self.registry
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Process one control message. AUTO mode messages yield nothing.
    pub async fn handle(&self, msg: RecognizeControl) -> Option<RecognizeResult> {
        if msg.record_mode != RecordMode::Manual {
            debug!("Ignoring {:?} message in {:?} record mode", msg.action, msg.record_mode);
            return None;
        }

        let result = match msg.action {
            RecordAction::Start => self.start().await,
            RecordAction::Stop => {
                let stream_id = msg.stream_id.unwrap_or_default();
                self.stop(&stream_id, msg.nlu_model.as_deref()).await
            }
        };

        Some(result)
    }

    /// Process a stream of control messages in order and return the result
    /// of the last one handled.
    ///
    /// A START's stream id stays live after the stream ends so a later stream
    /// can STOP it. Sessions are only released when the future is dropped
    /// before the stream is exhausted.
    pub async fn recognize_stream<S>(&self, messages: S) -> Option<RecognizeResult>
    where
        S: Stream<Item = RecognizeControl>,
    {
        let mut open = OpenSessions {
            handler: self,
            ids: Vec::new(),
        };
        let mut last = None;

        futures::pin_mut!(messages);
        while let Some(msg) = messages.next().await {
            let Some(result) = self.handle(msg).await else {
                continue;
            };

            match result.status {
                RecognizeStatus::RecProcessing => open.ids.push(result.stream_id.clone()),
                _ => open.ids.retain(|id| *id != result.stream_id),
            }
            last = Some(result);
        }

        // Completed normally; open sessions are left for STOP or the sweeper
        open.ids.clear();
        last
    }

    /// Begin recording a voice command
    pub async fn start(&self) -> RecognizeResult {
        let (handle, artifact) = match self.capture.start_capture().await {
            Ok(started) => started,
            Err(e) => {
                error!("Failed to start voice capture: {}", e);
                return RecognizeResult::with_status("", RecognizeStatus::VoiceNotRecognized);
            }
        };

        let stream_id = self.registry.begin(handle, artifact);
        info!("[ReqID#{}] Recording started", stream_id);

        RecognizeResult::with_status(stream_id, RecognizeStatus::RecProcessing)
    }

    /// Finish a recording and recognize the command it holds
    pub async fn stop(&self, stream_id: &str, nlu_model: Option<&str>) -> RecognizeResult {
        let session = match self.registry.end(stream_id) {
            Ok(session) => session,
            Err(e) => {
                warn!("[ReqID#{}] {}", stream_id, e);
                return RecognizeResult::with_status(stream_id, RecognizeStatus::SessionNotFound);
            }
        };

        let RecordingSession { handle, artifact, .. } = session;
        let _dispose = DisposeArtifact {
            path: artifact.clone(),
            keep: self.store_voice_commands,
        };

        if let Err(e) = self.capture.stop_capture(handle).await {
            error!("[ReqID#{}] Failed to stop voice capture: {}", stream_id, e);
            return RecognizeResult::with_status(stream_id, RecognizeStatus::VoiceNotRecognized);
        }

        let model = match nlu_model.map(str::parse::<NluModel>).transpose() {
            Ok(model) => model.unwrap_or(NluModel::Snips),
            Err(e) => {
                warn!("[ReqID#{}] {}", stream_id, e);
                return RecognizeResult::with_status(stream_id, RecognizeStatus::NluModelNotSupported);
            }
        };

        let command = match self.transcriber.transcribe(&artifact).await {
            Ok(text) => text,
            Err(e) => {
                warn!("[ReqID#{}] {}", stream_id, e);
                return RecognizeResult::with_status(stream_id, RecognizeStatus::VoiceNotRecognized);
            }
        };

        info!("[ReqID#{}] Voice command: {}", stream_id, command);

        self.extract(stream_id, command, model).await
    }

    /// Recognize a typed command, skipping capture and transcription
    pub async fn recognize_text(&self, text: &str, nlu_model: Option<&str>) -> RecognizeResult {
        let req_id = crate::session::generate_session_id();

        let model = match nlu_model.map(str::parse::<NluModel>).transpose() {
            Ok(model) => model.unwrap_or(NluModel::Snips),
            Err(e) => {
                warn!("[ReqID#{}] {}", req_id, e);
                return RecognizeResult::with_status(req_id, RecognizeStatus::NluModelNotSupported);
            }
        };

        self.extract(&req_id, text.trim().to_string(), model).await
    }

    async fn extract(&self, stream_id: &str, command: String, model: NluModel) -> RecognizeResult {
        let Some(engine) = self.nlu.get(model) else {
            warn!("[ReqID#{}] NLU model {} is not configured", stream_id, model);
            return RecognizeResult::with_status(stream_id, RecognizeStatus::NluModelNotSupported);
        };

        let extracted = match engine.extract_intent(&command).await {
            Ok(extracted) => extracted,
            Err(e) => {
                error!("[ReqID#{}] {} failed: {}", stream_id, engine.name(), e);
                Default::default()
            }
        };

        let status = if extracted.intent.is_empty() {
            RecognizeStatus::IntentNotRecognized
        } else {
            RecognizeStatus::RecSuccess
        };

        info!(
            "[ReqID#{}] Intent '{}' with {} slots via {}",
            stream_id,
            extracted.intent,
            extracted.slots.len(),
            engine.name()
        );

        RecognizeResult {
            command,
            intent: extracted.intent,
            intent_slots: extracted.slots,
            stream_id: stream_id.to_string(),
            status,
        }
    }

    /// Stop and dispose of every session older than `max_age`
    pub async fn reap_abandoned(&self, max_age: Duration) -> usize {
        let reaped = self.registry.reap_expired(max_age);
        let count = reaped.len();

        for session in reaped {
            warn!(
                "[ReqID#{}] Reaping abandoned recording after {:.0}s",
                session.id,
                session.age().as_secs_f64()
            );
            let _dispose = DisposeArtifact {
                path: session.artifact,
                keep: self.store_voice_commands,
            };
            if let Err(e) = self.capture.stop_capture(session.handle).await {
                warn!("[ReqID#{}] Failed to stop abandoned capture: {}", session.id, e);
            }
        }

        count
    }

    /// Periodically reap abandoned sessions
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let handler = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let reaped = handler.reap_abandoned(max_age).await;
                if reaped > 0 {
                    info!("Reaped {} abandoned recording sessions", reaped);
                }
            }
        })
    }
}

/// Sessions started by a stream whose future was dropped mid-stream
struct OpenSessions<'a> {
    handler: &'a SessionHandler,
    ids: Vec<String>,
}

impl Drop for OpenSessions<'_> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            if let Ok(session) = self.handler.registry.end(&id) {
                warn!("[ReqID#{}] Stream closed while recording, releasing capture", id);
                // Dropping the handle stops the capture task
                drop(session.handle);
                drop(DisposeArtifact {
                    path: session.artifact,
                    keep: self.handler.store_voice_commands,
                });
            }
        }
    }
}
