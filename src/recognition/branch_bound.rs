use super::dtw::{self, DtwParams};
use super::queue::AscendingQueue;
use super::score::ScoreAggregator;
use crate::features::FeatureVector;
use crate::model::Model;
use tracing::debug;

/// Open node: sample `sample` whose next column to evaluate is `pos`.
/// `pos == total` marks a completed alignment.
#[derive(Debug, Clone, Copy)]
struct Node {
    pos: usize,
    sample: usize,
}

/// Best-first search over partial alignments, used once the rest of the
/// utterance is known.
///
/// Picks up where the time-synchronous decoder stopped: every active sample
/// already holds its columns up to `start_pos`. The lowest-scored open node
/// is extended one column at a time, so samples that drift away from the
/// utterance are never evaluated to the end.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    params: DtwParams,
    nbest: usize,
}

impl BranchAndBound {
    pub fn new(params: DtwParams, nbest: usize) -> Self {
        Self { params, nbest }
    }

    /// Finish decoding and insert up to `nbest` completed hypotheses into
    /// `scores`. Returns the number found.
    ///
    /// `utterance[0]` is the frame of column `start_pos` (already decoded);
    /// `utterance[i]` is the frame of column `start_pos + i`.
    pub fn search(
        &self,
        model: &mut Model,
        start_pos: usize,
        utterance: &[FeatureVector],
        scores: &mut ScoreAggregator,
    ) -> usize {
        if utterance.len() < 2 {
            return 0;
        }
        let params = &self.params;
        let total = start_pos + utterance.len();

        let mut open = AscendingQueue::new();
        for k in 0..model.sample_count() {
            let sample = model.sample(k);
            if !sample.is_active() || !dtw::admissible(sample.len(), total, params) {
                continue;
            }
            let score = dtw::column_minimum(&sample.window, start_pos);
            open.insert(score, Node { pos: start_pos + 1, sample: k });
        }
        debug!(seeds = open.len(), start_pos, total, "branch and bound");

        let mut found = 0;
        while found < self.nbest {
            let Some((score, node)) = open.pop() else {
                break;
            };

            if node.pos == total {
                let item = model.owner(node.sample);
                debug!(sample = node.sample, item, score, "hypothesis");
                scores.insert(score, item);
                found += 1;
                continue;
            }

            let offset = node.pos - start_pos;
            let sample = model.sample_mut(node.sample);
            let column_min = dtw::advance_column(
                &mut sample.window,
                &sample.frames,
                node.pos,
                &utterance[offset],
                &utterance[offset - 1],
                params,
            );
            if column_min > params.score_threshold {
                continue;
            }

            if node.pos + 1 == total {
                let corner = dtw::corner_score(&sample.window, sample.len(), node.pos, params);
                if corner <= params.score_threshold {
                    open.insert(corner, Node { pos: total, ..node });
                }
            } else {
                open.insert(column_min, Node { pos: node.pos + 1, ..node });
            }
        }
        found
    }
}
