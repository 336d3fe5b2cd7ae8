//! Voice recording sessions
//!
//! - `registry`: concurrent store of in-flight recordings keyed by id
//! - `handler`: START/STOP protocol over the registry, STT and NLU

mod handler;
mod registry;

pub use handler::{
    RecognizeControl, RecognizeResult, RecognizeStatus, RecordAction, RecordMode, ServiceStatus,
    SessionHandler,
};
pub use registry::{generate_session_id, RecordingSession, RegistryError, SessionRegistry};
