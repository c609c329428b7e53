/// Rolling buffer that cuts a chunk stream into overlapping windows.
///
/// Each push appends a chunk; [`Framer::frames`] then yields every complete
/// window of `window` samples spaced `hop` samples apart and keeps the
/// unconsumed tail for the next chunk.
#[derive(Debug, Clone)]
pub struct Framer {
    window: usize,
    hop: usize,
    buffer: Vec<i16>,
}

impl Framer {
    /// # Panics
    /// Debug builds assert `0 < hop <= window`.
    pub fn new(window: usize, hop: usize) -> Self {
        debug_assert!(hop > 0 && hop <= window);
        Self {
            window,
            hop,
            buffer: Vec::with_capacity(window * 8),
        }
    }

    /// Drop any buffered samples (start of a new utterance).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn push(&mut self, chunk: &[i16]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of complete windows currently buffered.
    pub fn available(&self) -> usize {
        if self.buffer.len() < self.window {
            0
        } else {
            (self.buffer.len() - self.window) / self.hop + 1
        }
    }

    /// Hand every complete window to `f` as `(index, count, window)` and
    /// shift the remainder to the front.
    pub fn frames(&mut self, mut f: impl FnMut(usize, usize, &[i16])) {
        let count = self.available();
        for index in 0..count {
            let start = index * self.hop;
            f(index, count, &self.buffer[start..start + self.window]);
        }
        self.buffer.drain(..count * self.hop);
    }

    /// Samples carried over to the next chunk.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
