pub mod audio;
pub mod config;
pub mod http;
pub mod mapper;
pub mod nats;
pub mod nlu;
pub mod session;
pub mod stt;
pub mod vehicle;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    Capture, CaptureConfig, CaptureError, CaptureHandle, WavCapture,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use mapper::{Catalog, ExecutionItem, IntentSlot, Mapper, ValidationError};
pub use nats::{AudioFrameMessage, NatsClient, TranscriptMessage};
pub use nlu::{IntentExtractor, IntentResult, NluEngines, NluError, NluModel};
pub use session::{
    RecognizeControl, RecognizeResult, RecognizeStatus, RecordAction, RecordMode, RegistryError,
    ServiceStatus, SessionHandler, SessionRegistry,
};
pub use stt::{Transcriber, TranscriptionError};
pub use vehicle::{CommandExecutor, ExecuteResult, ExecuteStatus, SignalClient, SignalClientError};
