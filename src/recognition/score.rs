//! Ranked hypotheses of one utterance and the consensus rule that turns them
//! into a result.

use super::queue::AscendingQueue;

/// One completed alignment: its normalized cost and the model item the
/// matched sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hypothesis {
    pub score: f32,
    pub item: usize,
}

/// Collects hypotheses for the current utterance, best first.
#[derive(Debug, Default)]
pub struct ScoreAggregator {
    ranked: AscendingQueue<usize>,
}

impl ScoreAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, score: f32, item: usize) {
        self.ranked.insert(score, item);
    }

    pub fn clear(&mut self) {
        self.ranked.clear();
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn hypotheses(&self) -> Vec<Hypothesis> {
        self.ranked
            .iter()
            .map(|(score, &item)| Hypothesis { score, item })
            .collect()
    }

    /// Best hypothesis, whether or not it is accepted.
    pub fn best(&self) -> Option<Hypothesis> {
        self.ranked
            .peek()
            .map(|(score, &item)| Hypothesis { score, item })
    }

    /// Item the ranking agrees on, or `None` for no match.
    ///
    /// * one hypothesis is accepted as is, two must agree;
    /// * with three or more, the first three agreeing wins outright;
    /// * otherwise the first two must agree and either be clearly separated
    ///   from the third (`s2 - s1 >= 2 (s1 - s0)`) or have no hypothesis
    ///   for the same item ranked past the middle of the list.
    pub fn resolve(&self) -> Option<usize> {
        let ranked = self.hypotheses();
        match ranked.as_slice() {
            [] => None,
            [only] => Some(only.item),
            [a, b] => (a.item == b.item).then_some(a.item),
            [a, b, c, ..] => {
                if a.item == b.item && b.item == c.item {
                    return Some(a.item);
                }
                if a.item != b.item {
                    return None;
                }
                if c.score - b.score >= 2.0 * (b.score - a.score) {
                    return Some(a.item);
                }

                let half = ranked.len() / 2;
                let late_return = ranked
                    .iter()
                    .enumerate()
                    .skip(2)
                    .any(|(index, h)| h.item == a.item && index + 1 > half);
                (!late_return).then_some(a.item)
            }
        }
    }
}
