pub mod backend;
pub mod capture;
pub mod file;
pub mod recorder;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, FileBackend, NatsBackend};
pub use capture::{Capture, CaptureConfig, CaptureError, CaptureHandle, WavCapture};
pub use file::AudioFile;
pub use recorder::{convert_frame, RecordingSummary, WavRecorder};
