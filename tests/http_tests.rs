// Integration tests for the HTTP API
//
// Requests go straight to the router via tower's `oneshot`; no socket is bound.

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use voice_agent::audio::recorder::RecordingSummary;
use voice_agent::audio::{Capture, CaptureError, CaptureHandle};
use voice_agent::mapper::{Catalog, IntentSlot, Mapper};
use voice_agent::nlu::{IntentExtractor, IntentResult, NluEngines, NluError};
use voice_agent::session::{ServiceStatus, SessionHandler};
use voice_agent::stt::{Transcriber, TranscriptionError};
use voice_agent::vehicle::{CommandExecutor, InMemorySignals};
use voice_agent::{create_router, AppState};

struct TempCapture(PathBuf);

#[async_trait::async_trait]
impl Capture for TempCapture {
    async fn start_capture(&self) -> Result<(CaptureHandle, PathBuf), CaptureError> {
        let path = self.0.join(format!("{}.wav", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"RIFF")?;

        let file_path = path.clone();
        let handle = CaptureHandle::spawn(move |stop_rx| async move {
            stop_rx.await.ok();
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

struct EchoTranscriber;

#[async_trait::async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, _artifact: &Path) -> Result<String, TranscriptionError> {
        Ok("set the volume to thirty".to_string())
    }
}

struct VolumeNlu;

#[async_trait::async_trait]
impl IntentExtractor for VolumeNlu {
    async fn extract_intent(&self, _text: &str) -> Result<IntentResult, NluError> {
        Ok(IntentResult {
            intent: "VolumeControl".to_string(),
            slots: vec![
                IntentSlot::new("volume_control_action", "set"),
                IntentSlot::new("numeric_value", "thirty"),
            ],
        })
    }

    fn name(&self) -> &str {
        "volume"
    }
}

fn app(dir: &Path, signals: InMemorySignals) -> Result<axum::Router> {
    let config = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");
    let catalog = Catalog::load(
        config.join("intents_vss_map.json"),
        config.join("vss_signals_spec.json"),
    )?;

    let handler = Arc::new(SessionHandler::new(
        Arc::new(TempCapture(dir.to_path_buf())),
        Arc::new(EchoTranscriber),
        NluEngines::new().with_snips(Arc::new(VolumeNlu)),
        false,
    ));
    let executor = Arc::new(CommandExecutor::new(
        Mapper::new(Arc::new(catalog)),
        Arc::new(signals),
        1,
    ));

    Ok(create_router(AppState::new(
        handler,
        executor,
        ServiceStatus::new("hello auto"),
    )))
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };

    Ok((status, value))
}

#[tokio::test]
async fn test_health_and_status() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app(dir.path(), InMemorySignals::new())?;

    let (status, body) = send(&app, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));

    let (status, body) = send(&app, "GET", "/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!(true));
    assert_eq!(body["wake_word"], json!("hello auto"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[tokio::test]
async fn test_record_start_stop() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app(dir.path(), InMemorySignals::new())?;

    let (status, body) = send(&app, "POST", "/voice/record/start", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("REC_PROCESSING"));
    let stream_id = body["stream_id"].as_str().unwrap_or_default().to_string();
    assert_eq!(stream_id.len(), 8);

    let uri = format!("/voice/record/stop/{}", stream_id);
    let (status, body) = send(&app, "POST", &uri, Some(json!({ "nlu_model": "snips" }))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("REC_SUCCESS"));
    assert_eq!(body["intent"], json!("VolumeControl"));
    assert_eq!(body["command"], json!("set the volume to thirty"));

    let (status, body) = send(&app, "POST", &uri, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], json!("SESSION_NOT_FOUND"));
    Ok(())
}

#[tokio::test]
async fn test_recognize_stream_unsupported_model() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app(dir.path(), InMemorySignals::new())?;

    let (_, started) = send(&app, "POST", "/voice/record/start", None).await?;
    let messages = json!([
        { "action": "STOP", "stream_id": started["stream_id"], "nlu_model": "RASA" }
    ]);

    let (status, body) = send(&app, "POST", "/voice/recognize", Some(messages)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("NLU_MODEL_NOT_SUPPORTED"));
    Ok(())
}

#[tokio::test]
async fn test_recognize_stream_without_manual_messages() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app(dir.path(), InMemorySignals::new())?;

    let messages = json!([{ "action": "START", "record_mode": "AUTO" }]);
    let (status, body) = send(&app, "POST", "/voice/recognize", Some(messages)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_text_then_execute() -> Result<()> {
    let dir = TempDir::new()?;
    let signals = InMemorySignals::new();
    let app = app(dir.path(), signals.clone())?;

    let (status, recognized) = send(
        &app,
        "POST",
        "/voice/text",
        Some(json!({ "text": "set the volume to thirty" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recognized["status"], json!("REC_SUCCESS"));

    let (status, body) = send(
        &app,
        "POST",
        "/voice/execute",
        Some(json!({
            "intent": recognized["intent"],
            "intent_slots": recognized["intent_slots"]
        })),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("SUCCESS"));
    assert_eq!(body["items"][0]["signal"], json!("Vehicle.Cabin.Infotainment.Media.Volume"));
    assert_eq!(body["items"][0]["value"], json!("30"));
    assert_eq!(signals.get("Vehicle.Cabin.Infotainment.Media.Volume").as_deref(), Some("30"));
    Ok(())
}

#[tokio::test]
async fn test_recognize_stream_start_then_stop() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app(dir.path(), InMemorySignals::new())?;

    let (status, started) = send(&app, "POST", "/voice/recognize", Some(json!([{ "action": "START" }]))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], json!("REC_PROCESSING"));

    let messages = json!([
        { "action": "STOP", "stream_id": started["stream_id"], "nlu_model": "snips" }
    ]);
    let (status, body) = send(&app, "POST", "/voice/recognize", Some(messages)).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("REC_SUCCESS"));
    assert_eq!(body["stream_id"], started["stream_id"]);
    assert_eq!(body["command"], json!("set the volume to thirty"));
    Ok(())
}
