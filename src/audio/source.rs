use crate::audio::vad::peak_amplitude;
use crate::defaults;
use crate::error::{Result, VoicectlError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for capture devices feeding the recognition pipeline.
///
/// This trait allows swapping implementations (microphone, WAV replay, mock).
/// The capture station opens the device when listening starts and closes it
/// after each utterance.
pub trait AudioCapture: Send {
    /// Open the device for reading.
    fn open(&mut self) -> Result<()>;

    /// Fill `chunk` with the next block of 16-bit samples, blocking until it
    /// is available.
    ///
    /// # Returns
    /// The number of samples written. Fewer than `chunk.len()` means the
    /// source ran dry; `0` means it is exhausted and will never produce more.
    fn read(&mut self, chunk: &mut [i16]) -> Result<usize>;

    /// Release the device.
    fn close(&mut self) -> Result<()>;

    /// Read one chunk and return its peak amplitude.
    ///
    /// Used to calibrate `rec_level` / `stop_level`, never by the pipeline.
    fn block_max(&mut self) -> Result<i16> {
        let mut chunk = vec![0i16; defaults::CHUNK_SAMPLES];
        let read = self.read(&mut chunk)?;
        if read == 0 {
            return Err(VoicectlError::AudioCapture {
                message: "source exhausted".to_string(),
            });
        }
        Ok(peak_amplitude(&chunk[..read]))
    }
}

/// Counters shared between a [`MockAudioSource`] and the test observing it.
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl MockStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Mock capture device for testing.
///
/// Plays back a scripted list of chunks, then reports exhaustion (or keeps
/// producing silence with [`MockAudioSource::with_endless_silence`]).
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    script: VecDeque<Vec<i16>>,
    endless_silence: bool,
    open_failures: usize,
    fail_read_at: Option<usize>,
    error_message: String,
    is_open: bool,
    stats: MockStats,
}

impl MockAudioSource {
    /// Create a new mock source with an empty script.
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            endless_silence: false,
            open_failures: 0,
            fail_read_at: None,
            error_message: "mock audio error".to_string(),
            is_open: false,
            stats: MockStats::default(),
        }
    }

    /// Append chunks to the script.
    pub fn with_chunks(mut self, chunks: impl IntoIterator<Item = Vec<i16>>) -> Self {
        self.script.extend(chunks);
        self
    }

    /// Append `count` chunks whose peak amplitude is `peak`.
    pub fn with_level(self, peak: i16, count: usize) -> Self {
        self.with_chunks(std::iter::repeat_with(|| Self::square_chunk(peak)).take(count))
    }

    /// Produce silent chunks forever once the script is used up.
    pub fn with_endless_silence(mut self) -> Self {
        self.endless_silence = true;
        self
    }

    /// Make the first `count` calls to `open` fail.
    pub fn with_open_failures(mut self, count: usize) -> Self {
        self.open_failures = count;
        self
    }

    /// Fail the read with the given zero-based index.
    pub fn with_read_failure_at(mut self, read_index: usize) -> Self {
        self.fail_read_at = Some(read_index);
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Counters that stay observable after the source moves into a pipeline.
    pub fn stats(&self) -> MockStats {
        self.stats.clone()
    }

    /// Check if the device is currently open
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// A chunk alternating between `peak` and `-peak`.
    pub fn square_chunk(peak: i16) -> Vec<i16> {
        (0..defaults::CHUNK_SAMPLES)
            .map(|i| if i % 2 == 0 { peak } else { peak.saturating_neg() })
            .collect()
    }

    fn error(&self) -> VoicectlError {
        VoicectlError::AudioCapture {
            message: self.error_message.clone(),
        }
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCapture for MockAudioSource {
    fn open(&mut self) -> Result<()> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if self.open_failures > 0 {
            self.open_failures -= 1;
            return Err(self.error());
        }
        self.is_open = true;
        Ok(())
    }

    fn read(&mut self, chunk: &mut [i16]) -> Result<usize> {
        let index = self.stats.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_read_at == Some(index) {
            return Err(self.error());
        }

        match self.script.pop_front() {
            Some(data) => {
                let n = data.len().min(chunk.len());
                chunk[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None if self.endless_silence => {
                chunk.fill(0);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.is_open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_plays_script_then_exhausts() {
        let mut source = MockAudioSource::new().with_level(500, 2);
        let mut chunk = vec![0i16; defaults::CHUNK_SAMPLES];

        assert_eq!(source.read(&mut chunk).unwrap(), defaults::CHUNK_SAMPLES);
        assert_eq!(peak_amplitude(&chunk), 500);
        assert_eq!(source.read(&mut chunk).unwrap(), defaults::CHUNK_SAMPLES);
        assert_eq!(source.read(&mut chunk).unwrap(), 0);
        assert_eq!(source.stats().reads(), 3);
    }

    #[test]
    fn test_mock_endless_silence() {
        let mut source = MockAudioSource::new().with_endless_silence();
        let mut chunk = vec![7i16; 64];
        for _ in 0..3 {
            assert_eq!(source.read(&mut chunk).unwrap(), 64);
            assert!(chunk.iter().all(|&s| s == 0));
        }
    }

    #[test]
    fn test_mock_open_failures_then_success() {
        let mut source = MockAudioSource::new()
            .with_open_failures(2)
            .with_error_message("busy");

        let err = source.open().unwrap_err();
        assert_eq!(err.to_string(), "Audio capture failed: busy");
        assert!(source.open().is_err());
        assert!(source.open().is_ok());
        assert!(source.is_open());
        assert_eq!(source.stats().opens(), 3);

        source.close().unwrap();
        assert!(!source.is_open());
        assert_eq!(source.stats().closes(), 1);
    }

    #[test]
    fn test_mock_read_failure() {
        let mut source = MockAudioSource::new()
            .with_endless_silence()
            .with_read_failure_at(1);
        let mut chunk = vec![0i16; 16];
        assert!(source.read(&mut chunk).is_ok());
        assert!(matches!(
            source.read(&mut chunk),
            Err(VoicectlError::AudioCapture { .. })
        ));
    }

    #[test]
    fn test_block_max_reports_peak() {
        let mut source = MockAudioSource::new().with_chunks(vec![vec![3, -900, 12, 400]]);
        assert_eq!(source.block_max().unwrap(), 900);
        assert!(source.block_max().is_err());
    }

    #[test]
    fn test_square_chunk_handles_min_value() {
        let chunk = MockAudioSource::square_chunk(i16::MIN);
        assert_eq!(chunk[0], i16::MIN);
        assert_eq!(chunk[1], i16::MAX);
    }
}
