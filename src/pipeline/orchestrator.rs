//! Recognition pipeline that runs from startup until shutdown.

use crate::audio::source::AudioCapture;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, VoicectlError};
use crate::features::{FeatureVector, FrameProcessor};
use crate::model::Model;
use crate::pipeline::capture_station::CaptureStation;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::extraction_station::ExtractionStation;
use crate::pipeline::queue::StatusQueue;
use crate::pipeline::recognizer::RecognitionEngine;
use crate::pipeline::status::{CaptureState, SharedStatus};
use crate::pipeline::types::RecognitionEvent;
use crate::recognition::DtwParams;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Configuration for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Peak amplitude that counts as speech
    pub rec_level: i16,
    /// Peak amplitude at or below which a chunk counts as silence
    pub stop_level: i16,
    /// Delay between attempts to open the capture device
    pub open_retry: Duration,
    /// Samples per capture chunk
    pub chunk_samples: usize,
    pub prefetch_chunks: usize,
    pub onset_chunks: usize,
    pub release_chunks: usize,
    /// Hop between analysis windows; the window length comes from the
    /// frame processor
    pub hop_samples: usize,
    pub dtw: DtwParams,
    pub nbest: usize,
    /// Queued frames needed to finish an utterance with branch-and-bound
    pub branch_bound_lookahead: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rec_level: defaults::REC_LEVEL,
            stop_level: defaults::STOP_LEVEL,
            open_retry: Duration::from_secs(defaults::OPEN_RETRY_SECS),
            chunk_samples: defaults::CHUNK_SAMPLES,
            prefetch_chunks: defaults::PREFETCH_CHUNKS,
            onset_chunks: defaults::ONSET_CHUNKS,
            release_chunks: defaults::RELEASE_CHUNKS,
            hop_samples: defaults::HOP_SAMPLES,
            dtw: DtwParams::default(),
            nbest: defaults::NBEST,
            branch_bound_lookahead: defaults::BRANCH_BOUND_LOOKAHEAD,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            rec_level: config.audio.rec_level,
            stop_level: config.audio.stop_level,
            open_retry: Duration::from_secs(config.audio.open_retry_secs),
            dtw: DtwParams::from(&config.recognizer),
            nbest: config.recognizer.nbest,
            branch_bound_lookahead: config.recognizer.branch_bound_lookahead,
            ..Self::default()
        }
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    status: Arc<SharedStatus>,
    /// Join handles for spawned threads
    threads: Vec<JoinHandle<()>>,
    events: Receiver<RecognitionEvent>,
}

impl PipelineHandle {
    /// Receiver of recognition events. The last event of a run is always
    /// [`RecognitionEvent::Stopped`].
    pub fn events(&self) -> &Receiver<RecognitionEvent> {
        &self.events
    }

    /// Block for the next event; `None` once the pipeline is gone.
    pub fn recv(&self) -> Option<RecognitionEvent> {
        self.events.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<RecognitionEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Returns true until the pipeline starts exiting.
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Failure that stopped the pipeline, if any.
    pub fn failure(&self) -> Option<String> {
        self.status.failure()
    }

    /// Stops the pipeline and waits up to 2s for its threads.
    ///
    /// After the deadline, remaining threads are detached; they die with the
    /// process. A capture thread blocked in a device read is the usual
    /// straggler.
    pub fn stop(mut self) {
        self.status.shutdown();

        let deadline = Instant::now() + Duration::from_secs(2);
        let poll_interval = Duration::from_millis(20);

        loop {
            // Drain finished threads, joining each to catch panics
            let mut remaining = Vec::new();
            for handle in self.threads.drain(..) {
                if handle.is_finished() {
                    let name = handle.thread().name().unwrap_or("pipeline").to_string();
                    if let Err(panic_info) = handle.join() {
                        let msg = panic_info
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                            .unwrap_or("unknown panic");
                        error!(station = %name, "pipeline thread panicked: {msg}");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            self.threads = remaining;

            if self.threads.is_empty() {
                break;
            }

            if Instant::now() >= deadline {
                warn!(
                    threads = self.threads.len(),
                    "shutdown timeout, detaching pipeline threads"
                );
                break;
            }

            thread::sleep(poll_interval);
        }
        debug!("pipeline stopped");
    }
}

/// Recognition pipeline: AudioCapture → Capture → Extraction → Recognizer.
pub struct Pipeline {
    config: PipelineConfig,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Pipeline {
    /// Creates a new pipeline with default error reporter.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Starts the pipeline and arms capture.
    ///
    /// # Arguments
    /// * `source` - Capture device, opened by the capture station
    /// * `extractor` - Maps analysis windows to feature vectors
    /// * `model` - Speaker model to recognize against
    ///
    /// # Returns
    /// Handle to receive events from and stop the pipeline
    pub fn start(
        self,
        source: Box<dyn AudioCapture>,
        extractor: Box<dyn FrameProcessor>,
        model: Model,
    ) -> Result<PipelineHandle> {
        model.validate()?;

        let status = Arc::new(SharedStatus::new());
        let audio_queue: Arc<StatusQueue<Vec<i16>>> = Arc::new(StatusQueue::new());
        let feature_queue: Arc<StatusQueue<FeatureVector>> = Arc::new(StatusQueue::new());
        let (event_tx, event_rx) = unbounded();

        let capture = CaptureStation::new(source, audio_queue.clone(), status.clone(), &self.config)
            .with_error_reporter(self.error_reporter.clone());
        let extraction = ExtractionStation::new(
            audio_queue,
            feature_queue.clone(),
            status.clone(),
            extractor,
            &self.config,
        );
        let engine = RecognitionEngine::new(feature_queue, status.clone(), event_tx, model, &self.config);

        let spawn_failed = |e: std::io::Error| {
            status.shutdown();
            VoicectlError::PipelineStart {
                message: format!("failed to spawn station thread: {e}"),
            }
        };
        // consumers first
        let threads = vec![
            engine.spawn().map_err(spawn_failed)?,
            extraction.spawn().map_err(spawn_failed)?,
            capture.spawn().map_err(spawn_failed)?,
        ];

        let handle = PipelineHandle {
            status,
            threads,
            events: event_rx,
        };

        // the capture station reports Off once it is waiting to listen
        let ready = |s| matches!(s, CaptureState::Off | CaptureState::Exiting);
        if handle.status.wait_for_capture(ready) == Some(CaptureState::Off) {
            handle.status.request(CaptureState::Prefetching);
        }
        debug!("pipeline started");
        Ok(handle)
    }
}
