//! Capture station: reads the device and cuts the stream into utterances.

use crate::audio::source::AudioCapture;
use crate::audio::vad::{LevelCounter, PrefetchRing, peak_amplitude};
use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use crate::pipeline::orchestrator::PipelineConfig;
use crate::pipeline::queue::{StatusQueue, Tag};
use crate::pipeline::status::{CaptureState, SharedStatus};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

const STATION: &str = "capture";

enum Read {
    Chunk,
    Exhausted,
    Failed,
}

/// Runs the peak-amplitude state machine over the capture device.
///
/// While prefetching, every chunk goes into the prefetch ring; a run of loud
/// chunks switches to recording and flushes the ring downstream as
/// `Start, Data, ...`. A run of quiet chunks closes the utterance with `End`.
/// On abort the station announces `Abort` and keeps reading until the
/// speaker has been quiet for a release run. Every utterance ends with
/// exactly one of `End` or `Abort`.
pub struct CaptureStation {
    source: Box<dyn AudioCapture>,
    output: Arc<StatusQueue<Vec<i16>>>,
    status: Arc<SharedStatus>,
    reporter: Arc<dyn ErrorReporter>,
    chunk: Vec<i16>,
    ring: PrefetchRing,
    onset: LevelCounter,
    release: LevelCounter,
    open_retry: Duration,
    device_open: bool,
}

impl CaptureStation {
    pub fn new(
        source: Box<dyn AudioCapture>,
        output: Arc<StatusQueue<Vec<i16>>>,
        status: Arc<SharedStatus>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            source,
            output,
            status,
            reporter: Arc::new(LogReporter),
            chunk: vec![0; config.chunk_samples],
            ring: PrefetchRing::new(config.prefetch_chunks, config.chunk_samples),
            onset: LevelCounter::onset(config.rec_level, config.onset_chunks),
            release: LevelCounter::release(config.stop_level, config.release_chunks),
            open_retry: config.open_retry,
            device_open: false,
        }
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(STATION.to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        let mut new_start = true;

        loop {
            // an utterance closed with End is never also aborted: listening
            // again overrides a late abort request
            if new_start {
                new_start = false;
                if !self.listen() {
                    continue;
                }
            }

            match self.status.capture_state() {
                CaptureState::Exiting => break,
                CaptureState::Aborting => {
                    debug!("dropping utterance");
                    self.output.push(Tag::Abort, Vec::new());
                    if !self.drain() {
                        break;
                    }
                    new_start = true;
                    continue;
                }
                _ => {}
            }

            match self.read_chunk() {
                Read::Chunk => {}
                Read::Exhausted => {
                    // an abort may have landed after the check above
                    match self.status.capture_state() {
                        CaptureState::Recording => self.output.push(Tag::End, Vec::new()),
                        CaptureState::Aborting => self.output.push(Tag::Abort, Vec::new()),
                        _ => {}
                    }
                    info!("capture source exhausted");
                    self.status.shutdown();
                    break;
                }
                Read::Failed => break,
            }

            let peak = peak_amplitude(&self.chunk);
            match self.status.capture_state() {
                CaptureState::Prefetching => {
                    self.ring.push(&self.chunk);
                    if self.onset.observe(peak)
                        && self.status.request(CaptureState::Recording) == CaptureState::Recording
                    {
                        debug!(peak, "speech onset");
                        self.release.reset();
                        for (i, chunk) in self.ring.oldest_first().enumerate() {
                            let tag = if i == 0 { Tag::Start } else { Tag::Data };
                            self.output.push(tag, chunk.to_vec());
                        }
                    }
                }
                CaptureState::Recording => {
                    if self.release.observe(peak) {
                        debug!(peak, "speech release");
                        self.output.push(Tag::End, self.chunk.clone());
                        new_start = true;
                    } else {
                        self.output.push(Tag::Data, self.chunk.clone());
                    }
                }
                CaptureState::Off | CaptureState::Starting => new_start = true,
                // handled at the top of the loop
                CaptureState::Aborting | CaptureState::Exiting => {}
            }
        }

        self.output.push(Tag::Exit, Vec::new());
        self.close_device();
        debug!("capture station stopped");
    }

    /// Go idle and wait until asked to listen. Returns false when the
    /// pipeline is exiting instead.
    fn listen(&mut self) -> bool {
        self.close_device();
        self.ring.reset();
        self.onset.reset();
        self.release.reset();
        self.status.request(CaptureState::Off);

        // an abort may overtake a listen request before we wake up
        let wanted = |s| {
            matches!(
                s,
                CaptureState::Prefetching | CaptureState::Aborting | CaptureState::Exiting
            )
        };
        match self.status.wait_for_capture(wanted) {
            Some(CaptureState::Prefetching | CaptureState::Aborting) => self.open_device(),
            _ => false,
        }
    }

    fn open_device(&mut self) -> bool {
        loop {
            match self.source.open() {
                Ok(()) => {
                    self.device_open = true;
                    return true;
                }
                Err(e) => {
                    self.reporter.report(
                        STATION,
                        &StationError::Recoverable(format!(
                            "failed to open capture device, retrying in {:?}: {e}",
                            self.open_retry
                        )),
                    );
                    let exiting = |s| s == CaptureState::Exiting;
                    if self
                        .status
                        .wait_for_capture_timeout(exiting, self.open_retry)
                        .is_some()
                    {
                        return false;
                    }
                }
            }
        }
    }

    fn close_device(&mut self) {
        if !self.device_open {
            return;
        }
        self.device_open = false;
        if let Err(e) = self.source.close() {
            self.reporter.report(
                STATION,
                &StationError::Recoverable(format!("failed to close capture device: {e}")),
            );
        }
    }

    fn read_chunk(&mut self) -> Read {
        match self.source.read(&mut self.chunk) {
            Ok(0) => Read::Exhausted,
            Ok(n) => {
                self.chunk[n..].fill(0);
                Read::Chunk
            }
            Err(e) => {
                let error = StationError::Fatal(format!("capture read failed: {e}"));
                self.reporter.report(STATION, &error);
                self.status.record_failure(e.to_string());
                self.status.shutdown();
                Read::Failed
            }
        }
    }

    /// Read and discard until a release run of quiet chunks. Returns false
    /// when the source is gone or the pipeline is exiting.
    fn drain(&mut self) -> bool {
        self.release.reset();
        loop {
            if self.status.capture_state() == CaptureState::Exiting {
                return false;
            }
            match self.read_chunk() {
                Read::Chunk => {
                    if self.release.observe(peak_amplitude(&self.chunk)) {
                        return true;
                    }
                }
                Read::Exhausted => {
                    info!("capture source exhausted");
                    self.status.shutdown();
                    return false;
                }
                Read::Failed => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MockAudioSource;
    use crate::pipeline::error::CollectingReporter;
    use crate::pipeline::queue::QueueItem;

    const LOUD: i16 = 8000;

    fn config() -> PipelineConfig {
        PipelineConfig {
            open_retry: Duration::from_millis(5),
            ..PipelineConfig::default()
        }
    }

    fn drain_tags(queue: &StatusQueue<Vec<i16>>) -> Vec<Tag> {
        std::iter::from_fn(|| queue.try_pop())
            .map(|item: QueueItem<Vec<i16>>| item.tag)
            .collect()
    }

    /// Run the station against `source` until it exits, re-arming listening
    /// whenever it goes idle.
    fn run_to_end(source: MockAudioSource) -> (Vec<Tag>, Arc<SharedStatus>) {
        let queue = Arc::new(StatusQueue::new());
        let status = Arc::new(SharedStatus::new());
        let station = CaptureStation::new(Box::new(source), queue.clone(), status.clone(), &config());
        let handle = station.spawn().unwrap();

        while !handle.is_finished() {
            let idle = |s| s == CaptureState::Off;
            if status
                .wait_for_capture_timeout(idle, Duration::from_millis(10))
                .is_some()
            {
                status.request(CaptureState::Prefetching);
            }
        }
        handle.join().unwrap();
        (drain_tags(&queue), status)
    }

    #[test]
    fn test_utterance_is_framed_by_start_and_end() {
        let source = MockAudioSource::new()
            .with_level(0, 4)
            .with_level(LOUD, 6)
            .with_level(0, 5);
        let (tags, status) = run_to_end(source);

        // ring of 5 flushed at the third loud chunk, 3 more loud, 4 quiet, End
        let mut expected = vec![Tag::Start];
        expected.extend(std::iter::repeat_n(Tag::Data, 4 + 3 + 4));
        expected.push(Tag::End);
        expected.push(Tag::Exit);
        assert_eq!(tags, expected);
        assert!(status.failure().is_none());
        assert!(!status.is_running());
    }

    #[test]
    fn test_short_noise_does_not_start_recording() {
        let source = MockAudioSource::new()
            .with_level(LOUD, 2)
            .with_level(0, 1)
            .with_level(LOUD, 2)
            .with_level(0, 3);
        let (tags, _) = run_to_end(source);
        assert_eq!(tags, vec![Tag::Exit]);
    }

    #[test]
    fn test_exhaustion_while_recording_closes_utterance() {
        let source = MockAudioSource::new().with_level(LOUD, 8);
        let (tags, _) = run_to_end(source);
        assert_eq!(tags.first(), Some(&Tag::Start));
        assert_eq!(&tags[tags.len() - 2..], &[Tag::End, Tag::Exit]);
    }

    #[test]
    fn test_read_failure_is_fatal() {
        let reporter = Arc::new(CollectingReporter::new());
        let queue = Arc::new(StatusQueue::new());
        let status = Arc::new(SharedStatus::new());
        let source = MockAudioSource::new()
            .with_endless_silence()
            .with_read_failure_at(3)
            .with_error_message("unplugged");
        let station = CaptureStation::new(Box::new(source), queue.clone(), status.clone(), &config())
            .with_error_reporter(reporter.clone());
        let handle = station.spawn().unwrap();

        status.wait_for_capture(|s| s == CaptureState::Off);
        status.request(CaptureState::Prefetching);
        handle.join().unwrap();

        assert_eq!(drain_tags(&queue), vec![Tag::Exit]);
        assert!(status.failure().unwrap().contains("unplugged"));
        assert!(reporter.reports().iter().any(|(_, e)| e.is_fatal()));
    }

    #[test]
    fn test_open_failures_are_retried() {
        let source = MockAudioSource::new()
            .with_open_failures(2)
            .with_level(0, 3);
        let stats = source.stats();
        let (tags, _) = run_to_end(source);
        assert_eq!(tags, vec![Tag::Exit]);
        assert_eq!(stats.opens(), 3);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_abort_drains_until_quiet() {
        let queue = Arc::new(StatusQueue::new());
        let status = Arc::new(SharedStatus::new());
        // too short to ever start a recording
        let source = MockAudioSource::new()
            .with_level(LOUD, 2)
            .with_level(0, 5)
            .with_endless_silence();
        let stats = source.stats();
        let station = CaptureStation::new(Box::new(source), queue.clone(), status.clone(), &config());
        let handle = station.spawn().unwrap();

        status.wait_for_capture(|s| s == CaptureState::Off);
        status.request(CaptureState::Prefetching);
        assert_eq!(status.request(CaptureState::Aborting), CaptureState::Aborting);

        assert_eq!(queue.pop().tag, Tag::Abort);
        // back to idle once a release run of silence went by
        assert_eq!(
            status.wait_for_capture(|s| s == CaptureState::Off),
            Some(CaptureState::Off)
        );
        assert!(stats.reads() >= 5);

        status.shutdown();
        handle.join().unwrap();
        assert_eq!(drain_tags(&queue), vec![Tag::Exit]);
    }
}
