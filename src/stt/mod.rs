//! Speech-to-text collaborator
//!
//! Recognition itself runs in an external service. This module validates
//! the recorded artifact and hands its PCM to the recognizer.

mod nats;

pub use nats::NatsTranscriber;

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::audio::AudioFile;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Audio file '{}' not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("Audio file must be WAV format mono PCM: {0}")]
    FormatInvalid(String),

    #[error("Voice not recognized")]
    NotRecognized,

    #[error("Recognizer unavailable: {0}")]
    Backend(String),
}

/// Turns a recorded voice command into text
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, artifact: &Path) -> Result<String, TranscriptionError>;
}

/// Open an artifact and check it is something a recognizer can consume
pub fn load_recording(artifact: &Path) -> Result<AudioFile, TranscriptionError> {
    if !artifact.exists() {
        warn!("Audio file '{}' not found", artifact.display());
        return Err(TranscriptionError::FileNotFound(artifact.to_path_buf()));
    }

    let audio = AudioFile::open(artifact)
        .map_err(|e| TranscriptionError::FormatInvalid(format!("{:#}", e)))?;

    if !audio.is_mono_pcm16() {
        return Err(TranscriptionError::FormatInvalid(format!(
            "{} channels, {} bits per sample",
            audio.channels, audio.bits_per_sample
        )));
    }

    if audio.samples.is_empty() {
        return Err(TranscriptionError::NotRecognized);
    }

    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = load_recording(Path::new("/nonexistent/voice.wav")).unwrap_err();
        assert!(matches!(err, TranscriptionError::FileNotFound(_)));
    }

    #[test]
    fn test_stereo_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, &[1, 2, 3, 4]);

        let err = load_recording(&path).unwrap_err();
        assert!(matches!(err, TranscriptionError::FormatInvalid(_)));
    }

    #[test]
    fn test_not_a_wav_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("text.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();

        let err = load_recording(&path).unwrap_err();
        assert!(matches!(err, TranscriptionError::FormatInvalid(_)));
    }

    #[test]
    fn test_empty_recording_not_recognized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 1, &[]);

        assert_eq!(load_recording(&path).unwrap_err(), TranscriptionError::NotRecognized);
    }

    #[test]
    fn test_valid_recording() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ok.wav");
        write_wav(&path, 1, &[10, 20, 30]);

        let audio = load_recording(&path).unwrap();
        assert_eq!(audio.samples, vec![10, 20, 30]);
    }
}
