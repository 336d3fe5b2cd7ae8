use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::backend::AudioFrame;

/// Summary of a finished voice command recording
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    /// File path of the WAV artifact
    pub file_path: PathBuf,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of samples written
    pub sample_count: usize,
    /// Timestamp of the last frame, in milliseconds since capture started
    pub end_ms: u64,
}

/// Writes one voice command to disk as a WAV file.
///
/// Frames are converted to the recorder's rate and channel layout before
/// being written, so the artifact always matches what the recognizer
/// expects.
pub struct WavRecorder {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    summary: RecordingSummary,
}

impl WavRecorder {
    pub fn create(file_path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            summary: RecordingSummary {
                file_path,
                sample_rate,
                channels,
                sample_count: 0,
                end_ms: 0,
            },
        })
    }

    pub fn write_frame(&mut self, frame: AudioFrame) -> Result<()> {
        let frame = convert_frame(frame, self.summary.sample_rate, self.summary.channels);

        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer.write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            self.summary.end_ms = frame.timestamp_ms;
            self.summary.sample_count += frame.samples.len();
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<RecordingSummary> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()
                .context("Failed to finalize WAV file")?;
        }

        Ok(self.summary.clone())
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

/// Downsample and downmix a frame to the target format
pub fn convert_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    if processed.sample_rate != target_sample_rate {
        processed = downsample_frame(processed, target_sample_rate);
    }

    if processed.channels != target_channels && target_channels == 1 {
        processed = stereo_to_mono(processed);
    }

    processed
}

/// Downsample audio frame by decimation
fn downsample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if target_rate == 0 || frame.sample_rate <= target_rate {
        return frame; // Can't upsample
    }

    let ratio = (frame.sample_rate / target_rate) as usize;
    let channels = frame.channels.max(1) as usize;

    // Decimate whole interleaved frames so channels stay aligned
    let downsampled: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .step_by(ratio)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples: downsampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Convert stereo to mono by averaging channels
fn stereo_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels != 2 {
        return frame; // Only support stereo -> mono
    }

    let mono_samples = frame
        .samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}
