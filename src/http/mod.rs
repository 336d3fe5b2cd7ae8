//! HTTP API for voice command control
//!
//! - GET /health - Health check
//! - GET /status - Service version and wake word
//! - POST /voice/recognize - Process a START/STOP message sequence
//! - POST /voice/record/start - Start recording a voice command
//! - POST /voice/record/stop/:stream_id - Stop and recognize a recording
//! - POST /voice/text - Recognize a typed command
//! - POST /voice/execute - Map an intent to signals and apply it

mod handlers;
mod routes;
mod state;

pub use handlers::{ExecuteRequest, StopRecordingRequest, TextRequest};
pub use routes::create_router;
pub use state::AppState;
