// Integration tests for the START/STOP session protocol
//
// Capture, transcription and NLU are replaced with in-process fakes so the
// protocol, registry bookkeeping and artifact disposal can be observed.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::oneshot;
use voice_agent::audio::recorder::RecordingSummary;
use voice_agent::audio::{Capture, CaptureError, CaptureHandle};
use voice_agent::mapper::IntentSlot;
use voice_agent::nlu::{IntentExtractor, IntentResult, NluEngines, NluError};
use voice_agent::session::{
    RecognizeControl, RecognizeStatus, RecordAction, RecordMode, SessionHandler,
};
use voice_agent::stt::{Transcriber, TranscriptionError};

/// Writes an empty artifact per session and records whether captures stop
struct FakeCapture {
    dir: PathBuf,
    counter: AtomicUsize,
    stopped: Arc<AtomicUsize>,
    fail_start: bool,
}

impl FakeCapture {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            counter: AtomicUsize::new(0),
            stopped: Arc::new(AtomicUsize::new(0)),
            fail_start: false,
        }
    }
}

#[async_trait::async_trait]
impl Capture for FakeCapture {
    async fn start_capture(&self) -> Result<(CaptureHandle, PathBuf), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::Task("no microphone".into()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("cmd-{}.wav", n));
        std::fs::write(&path, b"RIFF")?;

        let stopped = Arc::clone(&self.stopped);
        let file_path = path.clone();
        let handle = CaptureHandle::spawn(move |stop_rx: oneshot::Receiver<()>| async move {
            stop_rx.await.ok();
            stopped.fetch_add(1, Ordering::SeqCst);
            Ok(RecordingSummary {
                file_path,
                sample_rate: 16000,
                channels: 1,
                sample_count: 0,
                end_ms: 0,
            })
        });

        Ok((handle, path))
    }
}

enum Transcript {
    Text(&'static str),
    Fail(TranscriptionError),
}

struct FakeTranscriber(Transcript);

#[async_trait::async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, artifact: &Path) -> Result<String, TranscriptionError> {
        assert!(artifact.exists(), "artifact must outlive transcription");
        match &self.0 {
            Transcript::Text(text) => Ok(text.to_string()),
            Transcript::Fail(e) => Err(e.clone()),
        }
    }
}

struct FakeNlu {
    intent: &'static str,
}

#[async_trait::async_trait]
impl IntentExtractor for FakeNlu {
    async fn extract_intent(&self, text: &str) -> Result<IntentResult, NluError> {
        if text.contains("gibberish") {
            return Ok(IntentResult::default());
        }
        Ok(IntentResult {
            intent: self.intent.to_string(),
            slots: vec![IntentSlot::new("volume_control_action", "turn up")],
        })
    }

    fn name(&self) -> &str {
        self.intent
    }
}

struct Fixture {
    dir: TempDir,
    handler: Arc<SessionHandler>,
    stopped: Arc<AtomicUsize>,
}

fn fixture(transcript: Transcript, store_voice_commands: bool) -> Result<Fixture> {
    let dir = TempDir::new()?;
    let capture = FakeCapture::new(dir.path());
    let stopped = Arc::clone(&capture.stopped);

    let engines = NluEngines::new()
        .with_snips(Arc::new(FakeNlu { intent: "VolumeControl" }))
        .with_rasa(Arc::new(FakeNlu { intent: "RasaVolume" }));

    let handler = SessionHandler::new(
        Arc::new(capture),
        Arc::new(FakeTranscriber(transcript)),
        engines,
        store_voice_commands,
    );

    Ok(Fixture {
        dir,
        handler: Arc::new(handler),
        stopped,
    })
}

fn control(action: RecordAction, stream_id: Option<&str>, nlu_model: Option<&str>) -> RecognizeControl {
    RecognizeControl {
        action,
        stream_id: stream_id.map(String::from),
        nlu_model: nlu_model.map(String::from),
        record_mode: RecordMode::Manual,
    }
}

#[tokio::test]
async fn test_start_stop_success() -> Result<()> {
    let fx = fixture(Transcript::Text("turn up the volume"), false)?;

    let started = fx.handler.start().await;
    assert_eq!(started.status, RecognizeStatus::RecProcessing);
    assert_eq!(started.stream_id.len(), 8);
    assert_eq!(fx.handler.active_sessions(), 1);

    let result = fx.handler.stop(&started.stream_id, Some("snips")).await;

    assert_eq!(result.status, RecognizeStatus::RecSuccess);
    assert_eq!(result.command, "turn up the volume");
    assert_eq!(result.intent, "VolumeControl");
    assert_eq!(result.intent_slots, vec![IntentSlot::new("volume_control_action", "turn up")]);
    assert_eq!(result.stream_id, started.stream_id);
    assert_eq!(fx.handler.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_deletes_artifact_unless_stored() -> Result<()> {
    for store in [false, true] {
        let fx = fixture(Transcript::Text("turn up the volume"), store)?;
        let started = fx.handler.start().await;
        let path = fx.dir.path().join("cmd-0.wav");
        assert!(path.exists());

        fx.handler.stop(&started.stream_id, None).await;
        assert_eq!(path.exists(), store);
    }
    Ok(())
}

#[tokio::test]
async fn test_stop_unknown_session() -> Result<()> {
    let fx = fixture(Transcript::Text("unused"), false)?;
    let started = fx.handler.start().await;

    let result = fx.handler.stop("12345678x", None).await;

    assert_eq!(result.status, RecognizeStatus::SessionNotFound);
    assert_eq!(result.stream_id, "12345678x");
    assert!(fx.handler.registry().contains(&started.stream_id));
    Ok(())
}

#[tokio::test]
async fn test_double_stop() -> Result<()> {
    let fx = fixture(Transcript::Text("turn up the volume"), false)?;
    let started = fx.handler.start().await;

    let first = fx.handler.stop(&started.stream_id, None).await;
    let second = fx.handler.stop(&started.stream_id, None).await;

    assert_eq!(first.status, RecognizeStatus::RecSuccess);
    assert_eq!(second.status, RecognizeStatus::SessionNotFound);
    assert_eq!(fx.stopped.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_transcription_failure_releases_resources() -> Result<()> {
    let fx = fixture(Transcript::Fail(TranscriptionError::NotRecognized), false)?;
    let started = fx.handler.start().await;
    let path = fx.dir.path().join("cmd-0.wav");

    let result = fx.handler.stop(&started.stream_id, None).await;

    assert_eq!(result.status, RecognizeStatus::VoiceNotRecognized);
    assert!(result.command.is_empty());
    assert_eq!(fx.stopped.load(Ordering::SeqCst), 1);
    assert!(!path.exists());
    assert_eq!(fx.handler.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_intent_not_recognized_keeps_command() -> Result<()> {
    let fx = fixture(Transcript::Text("gibberish words"), false)?;
    let started = fx.handler.start().await;

    let result = fx.handler.stop(&started.stream_id, Some("RASA")).await;

    assert_eq!(result.status, RecognizeStatus::IntentNotRecognized);
    assert_eq!(result.command, "gibberish words");
    assert!(result.intent.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unsupported_nlu_model() -> Result<()> {
    let fx = fixture(Transcript::Text("turn up the volume"), false)?;
    let started = fx.handler.start().await;
    let path = fx.dir.path().join("cmd-0.wav");

    let result = fx.handler.stop(&started.stream_id, Some("watson")).await;

    assert_eq!(result.status, RecognizeStatus::NluModelNotSupported);
    assert_eq!(fx.handler.active_sessions(), 0);
    assert_eq!(fx.stopped.load(Ordering::SeqCst), 1);
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn test_capture_start_failure() -> Result<()> {
    let dir = TempDir::new()?;
    let mut capture = FakeCapture::new(dir.path());
    capture.fail_start = true;
    let handler = SessionHandler::new(
        Arc::new(capture),
        Arc::new(FakeTranscriber(Transcript::Text("unused"))),
        NluEngines::new(),
        false,
    );

    let result = handler.start().await;

    assert_eq!(result.status, RecognizeStatus::VoiceNotRecognized);
    assert!(result.stream_id.is_empty());
    assert_eq!(handler.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stream_returns_last_result() -> Result<()> {
    let fx = fixture(Transcript::Text("turn up the volume"), false)?;

    // The stream id is only known after START, so drive START on its own
    let started = fx
        .handler
        .recognize_stream(futures::stream::iter(vec![control(RecordAction::Start, None, None)]))
        .await
        .expect("START yields a result");
    assert_eq!(started.status, RecognizeStatus::RecProcessing);

    // The session outlives the stream that started it
    assert_eq!(fx.handler.active_sessions(), 1);
    assert!(fx.handler.registry().contains(&started.stream_id));
    assert_eq!(fx.stopped.load(Ordering::SeqCst), 0);

    let messages = vec![
        control(RecordAction::Stop, Some("00000000x"), None),
        control(RecordAction::Stop, Some(&started.stream_id), Some("snips")),
    ];
    let result = fx
        .handler
        .recognize_stream(futures::stream::iter(messages))
        .await
        .expect("STOP yields a result");

    assert_eq!(result.status, RecognizeStatus::RecSuccess);
    assert_eq!(result.stream_id, started.stream_id);
    assert_eq!(result.command, "turn up the volume");
    assert_eq!(fx.handler.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_stream_releases_sessions() -> Result<()> {
    let fx = fixture(Transcript::Text("unused"), false)?;

    // START arrives, then the client goes quiet and the request is dropped
    let messages = futures::stream::iter(vec![control(RecordAction::Start, None, None)])
        .chain(futures::stream::pending());
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        fx.handler.recognize_stream(messages),
    )
    .await;
    assert!(outcome.is_err());

    assert_eq!(fx.handler.active_sessions(), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.stopped.load(Ordering::SeqCst), 1);
    assert!(!fx.dir.path().join("cmd-0.wav").exists());
    Ok(())
}

#[tokio::test]
async fn test_auto_mode_ignored() -> Result<()> {
    let fx = fixture(Transcript::Text("unused"), false)?;
    let mut msg = control(RecordAction::Start, None, None);
    msg.record_mode = RecordMode::Auto;

    assert!(fx.handler.handle(msg.clone()).await.is_none());
    assert!(fx
        .handler
        .recognize_stream(futures::stream::iter(vec![msg]))
        .await
        .is_none());
    assert_eq!(fx.handler.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_recognize_text() -> Result<()> {
    let fx = fixture(Transcript::Text("unused"), false)?;

    let result = fx.handler.recognize_text("  Turn up the volume!  ", None).await;
    assert_eq!(result.status, RecognizeStatus::RecSuccess);
    assert_eq!(result.intent, "VolumeControl");
    assert_eq!(result.command, "Turn up the volume!");

    let result = fx.handler.recognize_text("turn up", Some("dialogflow")).await;
    assert_eq!(result.status, RecognizeStatus::NluModelNotSupported);
    Ok(())
}

#[tokio::test]
async fn test_reap_abandoned_sessions() -> Result<()> {
    let fx = fixture(Transcript::Text("unused"), false)?;
    fx.handler.start().await;
    fx.handler.start().await;

    assert_eq!(fx.handler.reap_abandoned(Duration::from_secs(3600)).await, 0);
    assert_eq!(fx.handler.reap_abandoned(Duration::ZERO).await, 2);

    assert_eq!(fx.handler.active_sessions(), 0);
    assert_eq!(fx.stopped.load(Ordering::SeqCst), 2);
    assert!(!fx.dir.path().join("cmd-0.wav").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_sessions_independent() -> Result<()> {
    let fx = fixture(Transcript::Text("turn up the volume"), false)?;

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let handler = Arc::clone(&fx.handler);
            tokio::spawn(async move {
                let started = handler.start().await;
                handler.stop(&started.stream_id, None).await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await?.status, RecognizeStatus::RecSuccess);
    }
    assert_eq!(fx.handler.active_sessions(), 0);
    assert_eq!(fx.stopped.load(Ordering::SeqCst), 20);
    Ok(())
}
