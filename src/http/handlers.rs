use super::state::AppState;
use crate::mapper::IntentSlot;
use crate::session::{RecognizeControl, RecognizeResult, RecognizeStatus};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StopRecordingRequest {
    /// NLU engine, "snips" when absent
    pub nlu_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextRequest {
    pub text: String,
    pub nlu_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub intent: String,
    #[serde(default)]
    pub intent_slots: Vec<IntentSlot>,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub stream_id: String,
    pub status: RecognizeStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn status_code(status: RecognizeStatus) -> StatusCode {
    match status {
        RecognizeStatus::SessionNotFound => StatusCode::NOT_FOUND,
        RecognizeStatus::NluModelNotSupported => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    }
}

fn recognize_response(result: RecognizeResult) -> Response {
    (status_code(result.status), Json(result)).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/recognize
/// Process a sequence of control messages, returning the last result
pub async fn recognize_stream(
    State(state): State<AppState>,
    Json(messages): Json<Vec<RecognizeControl>>,
) -> impl IntoResponse {
    info!("Processing {} control messages", messages.len());

    match state
        .handler
        .recognize_stream(futures::stream::iter(messages))
        .await
    {
        Some(result) => recognize_response(result),
        None => {
            warn!("No control message was handled");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "No MANUAL control message in request".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /voice/record/start
/// Start recording a voice command
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.handler.start().await;

    (
        status_code(result.status),
        Json(StartRecordingResponse {
            stream_id: result.stream_id,
            status: result.status,
        }),
    )
}

/// POST /voice/record/stop/:stream_id
/// Stop a recording and recognize the command
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    body: Bytes,
) -> Response {
    let req: StopRecordingRequest = if body.is_empty() {
        StopRecordingRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("Invalid request body: {}", e),
                    }),
                )
                    .into_response()
            }
        }
    };
    info!("Stopping recording {}", stream_id);

    let result = state
        .handler
        .stop(&stream_id, req.nlu_model.as_deref())
        .await;

    recognize_response(result)
}

/// POST /voice/text
/// Recognize a typed command
pub async fn recognize_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> impl IntoResponse {
    let result = state
        .handler
        .recognize_text(&req.text, req.nlu_model.as_deref())
        .await;

    recognize_response(result)
}

/// POST /voice/execute
/// Map an intent to vehicle signals and apply the plan
pub async fn execute_command(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> impl IntoResponse {
    let req_id = crate::session::generate_session_id();
    let result = state
        .executor
        .execute(&req.intent, &req.intent_slots, &req_id)
        .await;

    (StatusCode::OK, Json(result))
}

/// GET /status
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status.clone())
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
