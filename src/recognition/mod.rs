//! Template matching: time-synchronous DTW with a branch-and-bound finish,
//! and the consensus rule over the resulting hypotheses.

pub mod branch_bound;
pub mod decoder;
pub mod dtw;
pub mod queue;
pub mod score;

pub use branch_bound::BranchAndBound;
pub use decoder::{Column, TimeSyncDecoder};
pub use dtw::DtwParams;
pub use queue::AscendingQueue;
pub use score::{Hypothesis, ScoreAggregator};
