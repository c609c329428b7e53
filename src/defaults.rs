//! Default configuration constants for voicectl.
//!
//! Shared by the configuration types, the pipeline and the recognizer so the
//! numbers that shape recognition live in exactly one place.

/// Default audio sample rate in Hz.
///
/// Feature extraction assumes 16kHz: the filterbank edges below are expressed
/// in FFT bins of a 256-point transform at this rate.
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per capture chunk (2048 bytes of 16-bit PCM, 64ms at 16kHz).
pub const CHUNK_SAMPLES: usize = 1024;

/// Number of chunks kept in the prefetch ring while waiting for speech.
///
/// When speech is detected the ring is flushed oldest-first so the onset of
/// the word is not lost.
pub const PREFETCH_CHUNKS: usize = 5;

/// Consecutive chunks above `rec_level` that start a recording.
pub const ONSET_CHUNKS: usize = 3;

/// Consecutive chunks at or below `stop_level` that end a recording.
pub const RELEASE_CHUNKS: usize = 5;

/// Default peak amplitude that counts as speech.
pub const REC_LEVEL: i16 = 2000;

/// Default peak amplitude at or below which a chunk counts as silence.
pub const STOP_LEVEL: i16 = 1000;

/// Seconds between attempts to open the capture device.
pub const OPEN_RETRY_SECS: u64 = 10;

/// Analysis window length in samples (also the FFT size).
pub const WINDOW_SAMPLES: usize = 256;

/// Hop between consecutive analysis windows in samples (10ms).
pub const HOP_SAMPLES: usize = 160;

/// Number of coefficients per feature vector.
pub const FEATURE_DIM: usize = 16;

/// Band edges of the filterbank, in power-spectrum bins.
///
/// Band `i` spans `FILTER_EDGES[i]..=FILTER_EDGES[i + 1]`; the edge bins are
/// shared between neighbouring bands at half weight.
pub const FILTER_EDGES: [usize; FEATURE_DIM + 1] = [
    0, 2, 6, 10, 14, 18, 22, 26, 30, 35, 41, 48, 57, 68, 81, 97, 116,
];

/// Maximum normalized alignment cost for a template to stay in the race.
pub const SCORE_THRESHOLD: f32 = 18.0;

/// Half width of the DTW adjustment window, in frames.
pub const ADJUST_WINDOW_WIDTH: usize = 90;

/// Cells an alignment may start or end away from the matrix corners.
pub const SLOPPY_CORNER: usize = 4;

/// Completed hypotheses collected by the branch-and-bound search.
pub const NBEST: usize = 6;

/// Minimum number of not yet decoded frames that makes switching to
/// branch-and-bound worthwhile once the utterance is complete.
pub const BRANCH_BOUND_LOOKAHEAD: usize = 30;

/// Command that stops listening instead of running a shell command.
pub const STOP_COMMAND: &str = "voicectl_off";

/// Stop command name written by older model editors.
pub const LEGACY_STOP_COMMAND: &str = "cvoicecontrol_off";

/// Speaker model file extension.
pub const MODEL_EXTENSION: &str = "cvc";
