//! WAV file capture source for replaying recorded commands.

use crate::audio::source::AudioCapture;
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VoicectlError};
use std::io::Read;
use std::path::Path;

/// Capture source that replays WAV file data as if it came from a microphone.
/// Supports arbitrary sample rates and channels, resampling to 16kHz mono.
///
/// The file position survives `close`/`open`, so consecutive utterances in
/// one file are heard one after another. Once the data is used up `read`
/// reports exhaustion.
pub struct WavAudioSource {
    samples: Vec<i16>,
    position: usize,
}

impl WavAudioSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| VoicectlError::AudioCapture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let source_channels = spec.channels;

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VoicectlError::AudioCapture {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        let mono_samples = downmix(&raw_samples, source_channels as usize);

        let samples = if source_rate != SAMPLE_RATE {
            resample(&mono_samples, source_rate, SAMPLE_RATE)
        } else {
            mono_samples
        };

        Ok(Self {
            samples,
            position: 0,
        })
    }

    /// Open a WAV file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| VoicectlError::AudioCapture {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        Self::from_reader(Box::new(std::io::BufReader::new(file)))
    }

    /// Samples left to replay.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }

    /// Total duration of the decoded audio at 16kHz.
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / SAMPLE_RATE as f64)
    }
}

impl AudioCapture for WavAudioSource {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, chunk: &mut [i16]) -> Result<usize> {
        let n = chunk.len().min(self.remaining());
        chunk[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Average interleaved channels down to mono.
pub(crate) fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub(crate) fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
