//! Recognition engine: consumes feature vectors, decodes utterances and
//! drives the capture station.

use crate::features::FeatureVector;
use crate::model::Model;
use crate::pipeline::orchestrator::PipelineConfig;
use crate::pipeline::queue::{QueueItem, StatusQueue, Tag};
use crate::pipeline::status::{CaptureState, SharedStatus};
use crate::pipeline::types::{Recognition, RecognitionEvent};
use crate::recognition::{BranchAndBound, Column, ScoreAggregator, TimeSyncDecoder};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace};

const STATION: &str = "recognizer";

enum Flow {
    Continue,
    Exit,
}

/// Consumer end of the pipeline and controller of the capture station.
///
/// Frames are decoded time-synchronously as they arrive. Once extraction
/// has finished the utterance and enough frames are still queued, the rest
/// is read in one go and handed to branch-and-bound. Every utterance yields
/// one [`RecognitionEvent`] unless it is aborted, after which capture is
/// asked to listen again.
pub struct RecognitionEngine {
    input: Arc<StatusQueue<FeatureVector>>,
    status: Arc<SharedStatus>,
    events: Sender<RecognitionEvent>,
    model: Model,
    decoder: TimeSyncDecoder,
    branch_bound: BranchAndBound,
    scores: ScoreAggregator,
    lookahead: usize,
    in_utterance: bool,
    /// Extraction finished the current utterance and its done flag was
    /// consumed by the branch-and-bound check.
    extraction_finished: bool,
}

impl RecognitionEngine {
    pub fn new(
        input: Arc<StatusQueue<FeatureVector>>,
        status: Arc<SharedStatus>,
        events: Sender<RecognitionEvent>,
        model: Model,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            input,
            status,
            events,
            model,
            decoder: TimeSyncDecoder::new(config.dtw),
            branch_bound: BranchAndBound::new(config.dtw, config.nbest),
            scores: ScoreAggregator::new(),
            lookahead: config.branch_bound_lookahead,
            in_utterance: false,
            extraction_finished: false,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(STATION.to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        loop {
            let item = self.input.pop();
            let flow = match item.tag {
                Tag::Exit => Flow::Exit,
                Tag::Start => self.start_utterance(item.data),
                Tag::Data | Tag::End => self.next_frame(item),
                Tag::Abort => {
                    debug!("utterance dropped by extraction");
                    self.in_utterance = false;
                    self.status.set_extraction_done(false);
                    self.rearm()
                }
            };
            if let Flow::Exit = flow {
                break;
            }
        }

        let error = self.status.failure();
        self.emit(RecognitionEvent::Stopped { error });
        debug!("recognition engine stopped");
    }

    fn start_utterance(&mut self, frame: FeatureVector) -> Flow {
        if self.in_utterance {
            debug!(pos = self.decoder.pos(), "restarting unfinished utterance");
        }
        self.in_utterance = true;
        self.extraction_finished = false;
        match self.decoder.begin(&mut self.model, &mut self.scores, frame) {
            Column::Continue => Flow::Continue,
            Column::Exhausted => self.abort_utterance(false),
        }
    }

    fn next_frame(&mut self, item: QueueItem<FeatureVector>) -> Flow {
        if !self.in_utterance {
            trace!(tag = ?item.tag, "frame outside an utterance");
            return Flow::Continue;
        }

        if self.branch_bound_ready() {
            return self.finish_with_branch_bound(item);
        }

        let is_end = item.tag == Tag::End;
        match self
            .decoder
            .advance(&mut self.model, &mut self.scores, item.data, is_end)
        {
            Column::Exhausted => self.abort_utterance(is_end),
            Column::Continue if is_end => self.finish_utterance(),
            Column::Continue => Flow::Continue,
        }
    }

    /// Checked once per column. Consumes the extraction done flag the first
    /// time it is seen for the utterance.
    fn branch_bound_ready(&mut self) -> bool {
        if self.extraction_finished
            || self.decoder.pos() < self.decoder.params().sloppy_corner + 1
            || !self.status.extraction_done()
        {
            return false;
        }
        self.status.set_extraction_done(false);
        self.extraction_finished = true;

        // the popped frame and the decoder's current one are in flight
        let remaining = self.input.len() + 2;
        trace!(remaining, lookahead = self.lookahead, "utterance complete");
        remaining >= self.lookahead
    }

    /// Read the rest of the utterance and decode it best-first.
    fn finish_with_branch_bound(&mut self, item: QueueItem<FeatureVector>) -> Flow {
        let start_pos = self.decoder.pos();
        let mut utterance = vec![*self.decoder.frame(), item.data];
        let mut tag = item.tag;

        while tag != Tag::End {
            let next = self.input.pop();
            match next.tag {
                Tag::Data | Tag::End => utterance.push(next.data),
                Tag::Exit => return Flow::Exit,
                Tag::Start | Tag::Abort => {
                    debug!(tag = ?next.tag, "utterance cut short");
                    self.in_utterance = false;
                    return self.rearm();
                }
            }
            tag = next.tag;
        }

        debug!(start_pos, frames = utterance.len(), "switching to branch and bound");
        self.branch_bound
            .search(&mut self.model, start_pos, &utterance, &mut self.scores);
        self.finish_utterance()
    }

    fn finish_utterance(&mut self) -> Flow {
        self.in_utterance = false;
        let event = match self.scores.resolve().and_then(|item| self.recognition(item)) {
            Some(recognition) => {
                info!(
                    item = recognition.item,
                    label = %recognition.label,
                    score = recognition.score,
                    "recognized"
                );
                RecognitionEvent::Recognized(recognition)
            }
            None => {
                info!(hypotheses = self.scores.len(), "no match");
                RecognitionEvent::NoMatch
            }
        };
        self.emit(event);
        self.status.set_extraction_done(false);
        self.rearm()
    }

    fn recognition(&self, item: usize) -> Option<Recognition> {
        let entry = self.model.item(item)?;
        let score = self
            .scores
            .hypotheses()
            .into_iter()
            .find(|h| h.item == item)
            .map_or(f32::MAX, |h| h.score);
        Some(Recognition {
            item,
            label: entry.label.clone(),
            command: entry.command.clone(),
            score,
        })
    }

    /// Drop the current utterance: stop capture, discard its remaining
    /// frames and listen again. `end_seen` is set when the frame that
    /// exhausted the model was already the utterance's last.
    fn abort_utterance(&mut self, end_seen: bool) -> Flow {
        self.in_utterance = false;
        let state = self.status.request(CaptureState::Aborting);
        debug!(pos = self.decoder.pos(), capture = ?state, "aborting utterance");

        if !end_seen {
            let mut dropped = 0usize;
            loop {
                let tag = self.input.pop().tag;
                if tag == Tag::Exit {
                    return Flow::Exit;
                }
                if tag.is_terminal() {
                    break;
                }
                dropped += 1;
            }
            trace!(dropped, "frames discarded");
        }

        if !self.extraction_finished && !self.status.wait_extraction_done() {
            return Flow::Exit;
        }

        let Some(stale) = self.input.clear() else {
            return Flow::Exit;
        };
        if stale > 0 {
            trace!(stale, "cleared feature queue");
        }
        self.status.set_extraction_done(false);
        self.rearm()
    }

    /// Wait for capture to go idle and ask it to listen again.
    fn rearm(&mut self) -> Flow {
        match self.status.wait_for_capture(|s| s == CaptureState::Off) {
            Some(_) => {
                self.status.request(CaptureState::Prefetching);
                Flow::Continue
            }
            None => Flow::Exit,
        }
    }

    fn emit(&self, event: RecognitionEvent) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}
