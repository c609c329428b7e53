use std::collections::VecDeque;

/// Queue ordered by ascending score.
///
/// Insertion is stable: an entry goes behind every entry whose score is less
/// than or equal to its own, so equal scores pop in arrival order. Both the
/// branch-and-bound open set and the hypothesis ranking rely on that order.
#[derive(Debug, Clone)]
pub struct AscendingQueue<T> {
    entries: VecDeque<(f32, T)>,
}

impl<T> AscendingQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, score: f32, value: T) {
        let at = self.entries.partition_point(|(s, _)| *s <= score);
        self.entries.insert(at, (score, value));
    }

    /// Remove the lowest-scored entry.
    pub fn pop(&mut self) -> Option<(f32, T)> {
        self.entries.pop_front()
    }

    pub fn peek(&self) -> Option<(f32, &T)> {
        self.entries.front().map(|(s, v)| (*s, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries from best to worst.
    pub fn iter(&self) -> impl Iterator<Item = (f32, &T)> {
        self.entries.iter().map(|(s, v)| (*s, v))
    }
}

impl<T> Default for AscendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
