use super::dtw::{self, DtwParams};
use super::score::ScoreAggregator;
use crate::features::FeatureVector;
use crate::model::Model;
use tracing::{debug, trace};

/// Result of evaluating one column against every active sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// At least one sample is still in the race.
    Continue,
    /// The last active sample was just deactivated.
    Exhausted,
}

/// Time-synchronous DTW: every incoming frame extends the alignment of all
/// active samples by one column.
///
/// Samples whose best cell in a column exceeds the score threshold, or that
/// fell out of the adjustment window, are deactivated and skipped from then
/// on. On the utterance's last frame each surviving sample contributes its
/// corner score to the aggregator.
#[derive(Debug, Clone)]
pub struct TimeSyncDecoder {
    params: DtwParams,
    pos: usize,
    frame: FeatureVector,
    last_frame: FeatureVector,
    active: usize,
}

impl TimeSyncDecoder {
    pub fn new(params: DtwParams) -> Self {
        Self {
            params,
            pos: 0,
            frame: [0.0; crate::defaults::FEATURE_DIM],
            last_frame: [0.0; crate::defaults::FEATURE_DIM],
            active: 0,
        }
    }

    pub fn params(&self) -> &DtwParams {
        &self.params
    }

    /// Column of the most recent frame.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Most recent frame.
    pub fn frame(&self) -> &FeatureVector {
        &self.frame
    }

    /// Samples still active in the current utterance.
    pub fn active(&self) -> usize {
        self.active
    }

    /// First frame of an utterance: reactivate every sample and fill column 0.
    pub fn begin(
        &mut self,
        model: &mut Model,
        scores: &mut ScoreAggregator,
        frame: FeatureVector,
    ) -> Column {
        scores.clear();
        model.activate_all();
        self.active = model.sample_count();
        self.pos = 0;
        self.last_frame = self.frame;
        self.frame = frame;
        self.evaluate(model, scores, false)
    }

    /// Next frame of the utterance; `is_end` marks the last one.
    pub fn advance(
        &mut self,
        model: &mut Model,
        scores: &mut ScoreAggregator,
        frame: FeatureVector,
        is_end: bool,
    ) -> Column {
        self.pos += 1;
        self.last_frame = self.frame;
        self.frame = frame;
        self.evaluate(model, scores, is_end)
    }

    fn evaluate(&mut self, model: &mut Model, scores: &mut ScoreAggregator, is_end: bool) -> Column {
        let pos = self.pos;
        let params = self.params;

        for k in 0..model.sample_count() {
            if !model.sample(k).is_active() {
                continue;
            }

            let len = model.sample(k).len();
            if pos > len + params.adjust_window_width {
                trace!(sample = k, pos, "sample left the adjustment window");
                if self.deactivate(model, k) == Column::Exhausted {
                    return Column::Exhausted;
                }
                continue;
            }

            let sample = model.sample_mut(k);
            let column_min = dtw::advance_column(
                &mut sample.window,
                &sample.frames,
                pos,
                &self.frame,
                &self.last_frame,
                &params,
            );
            if pos <= 1 {
                continue;
            }

            if column_min > params.score_threshold {
                trace!(sample = k, pos, score = column_min, "sample pruned");
                if self.deactivate(model, k) == Column::Exhausted {
                    return Column::Exhausted;
                }
                continue;
            }

            if is_end {
                let score = dtw::corner_score(&sample.window, len, pos, &params);
                if score <= params.score_threshold {
                    let item = model.owner(k);
                    debug!(sample = k, item, score, "hypothesis");
                    scores.insert(score, item);
                }
            }
        }
        Column::Continue
    }

    fn deactivate(&mut self, model: &mut Model, k: usize) -> Column {
        if model.deactivate(k) {
            self.active = self.active.saturating_sub(1);
        }
        if self.active == 0 {
            debug!(pos = self.pos, "all samples deactivated");
            Column::Exhausted
        } else {
            Column::Continue
        }
    }
}
