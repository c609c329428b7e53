//! Data types emitted by the recognition pipeline.

use serde::Serialize;

/// A confirmed match for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    /// Index of the matched item in the model.
    pub item: usize,
    /// Item label.
    pub label: String,
    /// Command configured for the item.
    pub command: String,
    /// Normalized DTW cost of the best hypothesis (lower is better).
    pub score: f32,
}

/// One outcome per finished utterance, plus a final `Stopped`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecognitionEvent {
    Recognized(Recognition),
    /// The utterance matched nothing with enough agreement.
    NoMatch,
    /// The pipeline shut down; `error` is set when a device failure caused it.
    Stopped { error: Option<String> },
}
