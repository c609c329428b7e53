//! Three-station recognition pipeline.
//!
//! Capture, feature extraction and recognition each run in their own
//! thread, connected by two tagged [`StatusQueue`]s. The recognizer is the
//! only consumer of results and also steers the capture station through
//! [`SharedStatus`].

pub mod capture_station;
pub mod error;
pub mod extraction_station;
pub mod orchestrator;
pub mod queue;
pub mod recognizer;
pub mod status;
pub mod types;

pub use capture_station::CaptureStation;
pub use error::{CollectingReporter, ErrorReporter, LogReporter, StationError};
pub use extraction_station::ExtractionStation;
pub use orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use queue::{QueueItem, StatusQueue, Tag};
pub use recognizer::RecognitionEngine;
pub use status::{CaptureState, SharedStatus, Watch};
pub use types::{Recognition, RecognitionEvent};
