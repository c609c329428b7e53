//! Voice Activity Detection (VAD) module.
//!
//! Peak-amplitude thresholding with consecutive-chunk counters: a recording
//! starts after a run of loud chunks and stops after a run of quiet ones.
//! Also holds the prefetch ring that keeps the chunks preceding the onset.

/// Largest absolute sample value in the chunk.
#[inline]
pub fn peak_amplitude(samples: &[i16]) -> i16 {
    let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
    peak.min(i16::MAX as u16) as i16
}

/// Counts consecutive chunks on one side of a level.
///
/// `Onset` counts chunks whose peak is at or above the level, `Release`
/// counts chunks whose peak is at or below it. Any chunk on the other side
/// resets the run.
#[derive(Debug, Clone, Copy)]
pub struct LevelCounter {
    kind: LevelKind,
    level: i16,
    needed: usize,
    run: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelKind {
    Onset,
    Release,
}

impl LevelCounter {
    /// Fires after `needed` consecutive chunks with peak `>= level`.
    pub fn onset(level: i16, needed: usize) -> Self {
        Self {
            kind: LevelKind::Onset,
            level,
            needed,
            run: 0,
        }
    }

    /// Fires after `needed` consecutive chunks with peak `<= level`.
    pub fn release(level: i16, needed: usize) -> Self {
        Self {
            kind: LevelKind::Release,
            level,
            needed,
            run: 0,
        }
    }

    /// Feed one chunk's peak. Returns true when the run is complete; the
    /// counter is reset at that point.
    pub fn observe(&mut self, peak: i16) -> bool {
        let counts = match self.kind {
            LevelKind::Onset => peak >= self.level,
            LevelKind::Release => peak <= self.level,
        };

        if counts {
            self.run += 1;
        } else {
            self.run = 0;
        }

        if self.run >= self.needed {
            self.run = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.run = 0;
    }

    /// Current length of the run.
    pub fn run(&self) -> usize {
        self.run
    }
}

/// Fixed ring of the most recent capture chunks. Pre-allocated, never grows.
///
/// Slots start out silent, so a flush right after a reset still yields
/// `capacity` chunks.
pub struct PrefetchRing {
    slots: Vec<Vec<i16>>,
    next: usize,
}

impl PrefetchRing {
    pub fn new(capacity: usize, chunk_samples: usize) -> Self {
        Self {
            slots: vec![vec![0i16; chunk_samples]; capacity.max(1)],
            next: 0,
        }
    }

    /// Overwrite the oldest slot with `chunk`.
    pub fn push(&mut self, chunk: &[i16]) {
        let slot = &mut self.slots[self.next];
        slot.clear();
        slot.extend_from_slice(chunk);
        self.next = (self.next + 1) % self.slots.len();
    }

    /// All slots, oldest first.
    pub fn oldest_first(&self) -> impl Iterator<Item = &[i16]> {
        let n = self.slots.len();
        (0..n).map(move |i| self.slots[(self.next + i) % n].as_slice())
    }

    /// Silence every slot.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.iter_mut().for_each(|s| *s = 0);
        }
        self.next = 0;
    }
}
